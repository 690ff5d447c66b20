use serde::Deserialize;
use tracing::warn;

use crate::select::select_highest_release;

/// Expands `{name}` in an index URL template, or appends the package name to
/// a plain simple-index base URL.
pub fn index_url_for(index: &str, package: &str) -> String {
    if index.contains("{name}") {
        index.replace("{name}", package)
    } else {
        format!("{}/{}", index.trim_end_matches('/'), package)
    }
}

pub fn unresolved_message(url: &str) -> String {
    format!("can't determine latest version from '{url}'")
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    #[serde(default)]
    info: ProjectInfo,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectInfo {
    #[serde(default)]
    version: Option<String>,
}

/// Extracts the latest version from an index response body.
///
/// JSON bodies are read from `info.version`. Anything else is treated as a
/// simple-index HTML page, where the highest final release among the
/// `<package>-<version>.tar.gz` links wins.
pub fn parse_index_response(body: &str, url: &str, package: &str) -> Result<String, String> {
    let body = body.trim();
    if body.is_empty() {
        return Err(unresolved_message(url));
    }

    if body.starts_with('{') {
        return match serde_json::from_str::<ProjectResponse>(body) {
            Ok(response) => response
                .info
                .version
                .map(|version| version.trim().to_string())
                .filter(|version| !version.is_empty())
                .ok_or_else(|| unresolved_message(url)),
            Err(err) => {
                warn!("failed to parse index json from {url}: {err}");
                Err(unresolved_message(url))
            }
        };
    }

    let prefix = format!("{package}-");
    let candidates = body
        .lines()
        .filter_map(sdist_file_stem)
        .filter_map(|stem| stem.strip_prefix(prefix.as_str()))
        .collect::<Vec<_>>();
    select_highest_release(candidates)
        .map(str::to_string)
        .ok_or_else(|| unresolved_message(url))
}

fn sdist_file_stem(line: &str) -> Option<&str> {
    const HREF: &str = "href=\"";
    let start = line.find(HREF)? + HREF.len();
    let rest = &line[start..];
    let href = &rest[..rest.find('"')?];
    let path = href.split_once('#').map_or(href, |(path, _)| path);
    let (_, file_name) = path.rsplit_once('/')?;
    file_name.strip_suffix(".tar.gz")
}
