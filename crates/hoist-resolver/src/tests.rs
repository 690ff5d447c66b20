use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;

use reqwest::blocking::Client;

use super::*;

const SIMPLE_INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<a href="../../packages/ab/tox-3.1.0.tar.gz#sha256=aaa">tox-3.1.0.tar.gz</a><br/>
<a href="../../packages/cd/tox-3.2.1.tar.gz#sha256=bbb">tox-3.2.1.tar.gz</a><br/>
<a href="../../packages/ef/tox-4.0b1.tar.gz#sha256=ccc">tox-4.0b1.tar.gz</a><br/>
<a href="../../packages/gh/tox-3.2.1-py2.py3-none-any.whl#sha256=ddd">wheel</a><br/>
<a href="../../packages/ij/tox-plugin-9.0.tar.gz#sha256=eee">other</a><br/>
</body></html>
"#;

fn start_one_shot_http_server(status_line: &str, payload: &str) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind one-shot test server");
    let address = listener
        .local_addr()
        .expect("must read one-shot test server address");
    let index = format!("http://{address}/pypi/{{name}}/json");
    let response = format!(
        "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("must accept test client");
        let mut request_buffer = [0_u8; 1024];
        let _ = stream.read(&mut request_buffer);
        stream
            .write_all(response.as_bytes())
            .expect("must write test response");
        stream.flush().expect("must flush test response");
    });
    (index, handle)
}

fn local_resolver() -> PypiResolver {
    let client = Client::builder()
        .no_proxy()
        .build()
        .expect("must build test client");
    PypiResolver::with_client(client)
}

#[test]
fn index_url_expands_template_or_appends_name() {
    assert_eq!(
        index_url_for("https://pypi.org/pypi/{name}/json", "tox"),
        "https://pypi.org/pypi/tox/json"
    );
    assert_eq!(
        index_url_for("https://example.test/simple/", "tox"),
        "https://example.test/simple/tox"
    );
}

#[test]
fn parse_release_versions() {
    assert_eq!(
        parse_release_version("1.2").map(|v| v.to_string()),
        Some("1.2.0".to_string())
    );
    assert_eq!(
        parse_release_version("2.0.1+local.7").map(|v| v.to_string()),
        Some("2.0.1".to_string())
    );
    let beta = parse_release_version("4.0b1").expect("beta must parse");
    assert!(!beta.pre.is_empty());
    assert!(parse_release_version("1").is_none());
    assert!(parse_release_version("1.2.3.4").is_none());
    assert!(parse_release_version("1.0.dev3").is_none());
    assert!(parse_release_version("banana").is_none());
}

#[test]
fn select_highest_release_skips_prereleases() {
    let selected = select_highest_release(["1.9", "1.10.0", "2.0rc1", "garbage"]);
    assert_eq!(selected, Some("1.10.0"));
    assert_eq!(select_highest_release(["2.0a1"]), None);
}

#[test]
fn json_response_uses_info_version() {
    let body = r#"{"info": {"name": "tox", "version": "4.11.3"}, "releases": {}}"#;
    assert_eq!(
        parse_index_response(body, "https://example.test/tox", "tox"),
        Ok("4.11.3".to_string())
    );
}

#[test]
fn malformed_json_is_reported_as_unresolved() {
    let err = parse_index_response("{not json", "https://example.test/tox", "tox")
        .expect_err("malformed body must not resolve");
    assert_eq!(
        err,
        "can't determine latest version from 'https://example.test/tox'"
    );

    let err = parse_index_response(r#"{"info": {}}"#, "u", "tox").expect_err("no version");
    assert!(err.starts_with("can't determine latest version"));
}

#[test]
fn simple_index_picks_highest_final_sdist() {
    let version = parse_index_response(SIMPLE_INDEX_PAGE, "https://example.test/simple/tox", "tox")
        .expect("simple index must resolve");
    assert_eq!(version, "3.2.1");
}

#[test]
fn empty_body_is_unresolved() {
    let err = parse_index_response("  \n", "https://example.test/tox", "tox")
        .expect_err("empty body must not resolve");
    assert!(err.contains("https://example.test/tox"));
}

#[test]
fn resolver_reads_json_over_http() {
    let (index, server) = start_one_shot_http_server(
        "HTTP/1.1 200 OK",
        r#"{"info": {"version": "1.4.2"}}"#,
    );
    let resolved = local_resolver().latest_version(&index, "tox");
    server.join().expect("test server must finish");
    assert_eq!(resolved, Ok("1.4.2".to_string()));
}

#[test]
fn resolver_reports_client_errors_with_url() {
    let (index, server) = start_one_shot_http_server("HTTP/1.1 404 Not Found", "missing");
    let url = index_url_for(&index, "no-such-package");
    let resolved = local_resolver().latest_version(&index, "no-such-package");
    server.join().expect("test server must finish");
    assert_eq!(resolved, Err(format!("can't determine latest version from '{url}'")));
}
