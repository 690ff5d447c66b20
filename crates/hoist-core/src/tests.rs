use std::time::Duration;

use super::*;

fn record(version: &str, packager: &str, delivery: &str) -> VersionRecord {
    VersionRecord {
        name: "foo".to_string(),
        version: version.to_string(),
        packager: packager.to_string(),
        delivery: delivery.to_string(),
        ..VersionRecord::default()
    }
}

#[test]
fn empty_record_is_invalid() {
    let record = VersionRecord::empty("foo");
    assert!(!record.is_valid());
    assert!(!record.still_valid(Duration::from_secs(60), 1_000));
    assert_eq!(record.to_string(), "foo: no version");
}

#[test]
fn problem_makes_record_invalid_even_with_version() {
    let mut record = VersionRecord::determined("foo", "1.0", "latest", "pypi");
    assert!(record.is_valid());
    record.problem = Some("index unreachable".to_string());
    assert!(!record.is_valid());
    assert_eq!(record.to_string(), "foo: index unreachable");
}

#[test]
fn invalidated_clears_version_and_keeps_original() {
    let record = VersionRecord::determined("foo", "1.0", "latest", "pypi");
    let broken = record.invalidated("some problem");
    assert_eq!(broken.version, "");
    assert_eq!(broken.problem.as_deref(), Some("some problem"));
    assert_eq!(record.version, "1.0");
    assert!(record.problem.is_none());
}

#[test]
fn equivalence_depends_only_on_version_packager_and_delivery() {
    let a = record("1.0", "venv", "symlink");
    let mut b = record("1.0", "venv", "symlink");
    b.channel = "stable".to_string();
    b.source = "somewhere else".to_string();
    b.timestamp = Some(42);
    b.runtime = "python3.12".to_string();
    assert!(a.equivalent(&b));
    assert!(b.equivalent(&a));

    for changed in [
        record("2.0", "venv", "symlink"),
        record("1.0", "pex", "symlink"),
        record("1.0", "venv", "wrap"),
    ] {
        assert!(!a.equivalent(&changed));
        assert!(!changed.equivalent(&a));
    }
}

#[test]
fn still_valid_respects_window_boundary() {
    let window = Duration::from_secs(600);
    let record = VersionRecord::determined("foo", "1.0", "latest", "pypi").stamped(1_000);
    assert!(record.still_valid(window, 1_000));
    assert!(record.still_valid(window, 1_599));
    assert!(!record.still_valid(window, 1_600));
    assert!(!record.still_valid(window, 5_000));
}

#[test]
fn still_valid_without_timestamp_follows_validity() {
    let window = Duration::from_secs(1);
    let record = VersionRecord::determined("foo", "1.0", "latest", "pypi");
    assert!(record.timestamp.is_none());
    assert!(record.still_valid(window, u64::MAX));
}

#[test]
fn dynamic_fields_record_install_mechanism() {
    let record = VersionRecord::determined("foo", "1.0", "latest", "pypi").with_dynamic_fields(
        PackagerKind::Pex,
        DeliveryKind::Wrap,
        "/usr/bin/python3",
        1_234,
    );
    assert_eq!(record.packager, "pex");
    assert_eq!(record.delivery, "wrap");
    assert_eq!(record.runtime, "/usr/bin/python3");
    assert_eq!(record.timestamp, Some(1_234));
    assert_eq!(record.hoist, HOIST_VERSION);
    assert_eq!(record.packager_kind(), Some(PackagerKind::Pex));
    assert_eq!(record.delivery_kind(), Some(DeliveryKind::Wrap));
}

#[test]
fn derived_from_carries_problem() {
    let desired = VersionRecord::empty("foo");
    let latest = VersionRecord::invalid("foo", "can't determine latest version");
    let derived = desired.derived_from(&latest);
    assert!(!derived.is_valid());
    assert_eq!(derived.name, "foo");
    assert_eq!(
        derived.problem.as_deref(),
        Some("can't determine latest version")
    );
}

#[test]
fn verbose_representation_mentions_mechanism_and_channel() {
    let mut record = record("1.0", "venv", "symlink");
    record.channel = "latest".to_string();
    record.source = "https://example.test/simple".to_string();
    assert_eq!(
        record.representation(true, Some("is already installed"), None),
        "foo 1.0 is already installed (as venv symlink, channel: latest, source: https://example.test/simple)"
    );
    assert_eq!(
        record.representation(true, None, Some("https://example.test/simple")),
        "foo 1.0 (as venv symlink, channel: latest)"
    );
    assert_eq!(VersionRecord::empty("foo").representation(true, None, None), "foo: no version");
}

#[test]
fn record_json_skips_transient_fields() {
    let mut record = VersionRecord::determined("foo", "1.0", "latest", "pypi").stamped(7);
    record.problem = Some("ignored".to_string());
    let raw = serde_json::to_string(&record).expect("must serialize");
    assert!(!raw.contains("ignored"));
    assert!(!raw.contains("\"name\""));
    assert!(!raw.contains("\"packager\""));

    let parsed: VersionRecord = serde_json::from_str(&raw).expect("must parse");
    assert_eq!(parsed.version, "1.0");
    assert_eq!(parsed.timestamp, Some(7));
    assert!(parsed.problem.is_none());
}

#[test]
fn record_role_file_names() {
    assert_eq!(RecordRole::Current.file_name(), ".current.json");
    assert_eq!(RecordRole::Latest.file_name(), ".latest.json");
}

#[test]
fn kinds_parse_round_trip() {
    for kind in PackagerKind::all() {
        assert_eq!(PackagerKind::parse(kind.as_str()), Some(kind));
    }
    for kind in DeliveryKind::all() {
        assert_eq!(DeliveryKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(PackagerKind::parse(" VENV "), Some(PackagerKind::Venv));
    assert_eq!(DeliveryKind::parse("wrapper"), Some(DeliveryKind::Wrap));
    assert_eq!(DeliveryKind::parse("hardlink"), None);
}

#[test]
fn parse_console_scripts_reads_only_its_section() {
    let raw = "\
[gui_scripts]
viewer = foo.gui:main

[console_scripts]
# comment
foo = foo.cli:main
foo-admin=foo.admin:run

[other]
bar = bar:main
";
    let entry_points = EntryPointSet::parse_console_scripts(raw);
    assert_eq!(entry_points.len(), 2);
    assert_eq!(entry_points.get("foo"), Some("foo.cli:main"));
    assert_eq!(entry_points.get("foo-admin"), Some("foo.admin:run"));
    assert!(!entry_points.contains("viewer"));
    assert!(!entry_points.contains("bar"));
}

#[test]
fn removed_in_lists_names_dropped_by_newer_set() {
    let old: EntryPointSet = [("foo", "foo:main"), ("baz", "foo.baz:main")]
        .into_iter()
        .collect();
    let new: EntryPointSet = [("foo", "foo:main")].into_iter().collect();
    assert_eq!(old.removed_in(&new), vec!["baz".to_string()]);
    assert!(new.removed_in(&old).is_empty());
}

#[test]
fn entry_points_serialize_as_plain_mapping() {
    let set: EntryPointSet = [("foo", "foo:main")].into_iter().collect();
    let raw = serde_json::to_string(&set).expect("must serialize");
    assert_eq!(raw, r#"{"foo":"foo:main"}"#);
}

#[test]
fn parse_default_config() {
    let config = HoistConfig::from_toml_str("").expect("empty config should parse");
    assert_eq!(config, HoistConfig::default());
    assert_eq!(config.channel, LATEST_CHANNEL);
    assert_eq!(config.index_url(), DEFAULT_INDEX);
    assert_eq!(config.install_timeout(), Duration::from_secs(30 * 60));
    assert_eq!(config.cleanup_age(), config.install_timeout());
    assert_eq!(config.packager_for("foo"), PackagerKind::Venv);
    assert_eq!(config.delivery_for("foo", None), DeliveryKind::Symlink);
}

#[test]
fn parse_full_config() {
    let content = r#"
index = "https://example.test/simple"
channel = "stable"
delivery = "wrap"
python = "/usr/bin/python3"
install_timeout_minutes = 10
cleanup_age_minutes = 45
version_check_seconds = 60

[pinned]
tox = "3.2.1"

[channels.stable]
black = "24.1.0"

[delivery_overrides]
tox = "copy"

[packager_overrides]
black = "pex"
"#;

    let config = HoistConfig::from_toml_str(content).expect("config should parse");
    assert_eq!(config.index_url(), "https://example.test/simple");
    assert_eq!(config.pinned_version("tox"), Some("3.2.1"));
    assert_eq!(config.pinned_version("black"), None);
    assert_eq!(config.channel_version("stable", "black"), Some("24.1.0"));
    assert_eq!(config.channel_version("latest", "black"), None);
    assert_eq!(config.delivery_for("tox", None), DeliveryKind::Copy);
    assert_eq!(config.delivery_for("black", Some(DeliveryKind::Copy)), DeliveryKind::Wrap);
    assert_eq!(config.packager_for("black"), PackagerKind::Pex);
    assert_eq!(config.packager_for("tox"), PackagerKind::Venv);
    assert_eq!(config.install_timeout(), Duration::from_secs(600));
    assert_eq!(config.cleanup_age(), Duration::from_secs(45 * 60));
    assert_eq!(config.version_check_window(), Duration::from_secs(60));
}

#[test]
fn delivery_falls_back_to_previous_install() {
    let config = HoistConfig::default();
    assert_eq!(
        config.delivery_for("foo", Some(DeliveryKind::Copy)),
        DeliveryKind::Copy
    );
}

#[test]
fn config_rejects_unknown_delivery() {
    let err = HoistConfig::from_toml_str("delivery = \"teleport\"\n")
        .expect_err("unknown delivery must fail at load time");
    assert!(format!("{err:#}").contains("failed to parse hoist config"));
}

#[test]
fn config_rejects_reserved_channel_and_zero_timeout() {
    let err = HoistConfig::from_toml_str("channel = \"pinned\"\n").expect_err("reserved");
    assert!(err.to_string().contains("reserved"));

    let err = HoistConfig::from_toml_str("install_timeout_minutes = 0\n").expect_err("zero");
    assert!(err.to_string().contains("install_timeout_minutes"));
}

#[test]
fn config_rejects_empty_pin() {
    let err = HoistConfig::from_toml_str("[pinned]\ntox = \" \"\n").expect_err("empty pin");
    assert!(err.to_string().contains("pinned version for 'tox'"));
}

#[test]
fn config_renders_back_to_toml() {
    let mut config = HoistConfig::default();
    config.pinned.insert("tox".to_string(), "3.2.1".to_string());
    config.delivery = Some(DeliveryKind::Copy);
    let rendered = config.to_toml_string().expect("must render");
    let parsed = HoistConfig::from_toml_str(&rendered).expect("rendered config must parse");
    assert_eq!(parsed, config);
}

#[test]
fn package_name_validation() {
    for valid in ["tox", "black", "poetry-core", "zope.interface", "a_b"] {
        validate_package_name(valid).expect("name should be valid");
    }
    for invalid in ["", ".hidden", "foo/bar", "foo bar", "../x"] {
        assert!(validate_package_name(invalid).is_err(), "{invalid} should fail");
    }
}

#[test]
fn entry_point_name_validation() {
    for valid in ["tox", "black-primer", "pip3.12", "foo_bar"] {
        validate_entry_point_name(valid).expect("name should be valid");
    }
    for invalid in ["", ".hidden", "../escaped", "nested/foo", "/usr/bin/foo", "a\\b"] {
        assert!(validate_entry_point_name(invalid).is_err(), "{invalid} should fail");
    }
}

#[test]
fn huge_timeouts_saturate_instead_of_overflowing() {
    let mut config = HoistConfig::default();
    config.install_timeout_minutes = u64::MAX;
    assert_eq!(config.install_timeout(), Duration::from_secs(u64::MAX));
    assert_eq!(config.cleanup_age(), Duration::from_secs(u64::MAX));

    config.cleanup_age_minutes = Some(u64::MAX / 2);
    assert_eq!(config.cleanup_age(), Duration::from_secs(u64::MAX));
}
