use super::*;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use hoist_core::{HoistConfig, VersionRecord};
use hoist_installer::{CheckStatus, CleanupReport, InstallOutcome, UninstallResult, UninstallStatus};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::completion::{resolve_completion_shell, write_completions_script};
use crate::dispatch::{apply_overrides, load_config, ConfigOverrides};
use crate::render::{
    format_check_line, format_cleanup_line, format_install_line, format_list_lines,
    format_uninstall_line, output_style_for, render_status_line,
};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "hoist-cli-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    std::fs::create_dir_all(&path).expect("must create test dir");
    path
}

fn installed(version: &str) -> VersionRecord {
    VersionRecord {
        packager: "venv".to_string(),
        delivery: "symlink".to_string(),
        ..VersionRecord::determined("tox", version, "latest", "pypi")
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn install_accepts_force_and_several_packages() {
    let cli = Cli::try_parse_from(["hoist", "install", "--force", "tox", "black"])
        .expect("install should parse");
    match cli.command {
        Commands::Install { force, packages } => {
            assert!(force);
            assert_eq!(packages, vec!["tox", "black"]);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn install_requires_a_package() {
    let err = Cli::try_parse_from(["hoist", "install"]).expect_err("must require packages");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn global_flags_are_accepted_after_the_subcommand() {
    let cli = Cli::try_parse_from([
        "hoist",
        "list",
        "--verbose",
        "--base",
        "/opt/bin",
        "--delivery",
        "wrapper",
        "--packager",
        "pex",
        "-vv",
    ])
    .expect("list should parse");
    assert_eq!(cli.base, Some(PathBuf::from("/opt/bin")));
    assert_eq!(cli.delivery, Some(DeliveryKind::Wrap));
    assert_eq!(cli.packager, Some(PackagerKind::Pex));
    assert_eq!(cli.log_verbosity, 2);
    assert!(matches!(cli.command, Commands::List { verbose: true }));
}

#[test]
fn unknown_delivery_is_rejected() {
    let err = Cli::try_parse_from(["hoist", "--delivery", "teleport", "list"])
        .expect_err("unknown delivery must fail");
    assert_eq!(err.kind(), ErrorKind::ValueValidation);
    assert!(err.to_string().contains("unknown delivery 'teleport'"));
}

#[test]
fn check_without_packages_parses() {
    let cli = Cli::try_parse_from(["hoist", "check"]).expect("check should parse");
    assert!(matches!(cli.command, Commands::Check { packages } if packages.is_empty()));
}

#[test]
fn overrides_win_over_file_configuration() {
    let file = HoistConfig::from_toml_str("channel = \"stable\"\ndelivery = \"copy\"\n")
        .expect("config should parse");
    let overrides = ConfigOverrides {
        index: Some("https://example.test/simple".to_string()),
        delivery: Some(DeliveryKind::Wrap),
        python: Some("python3.12".to_string()),
        ..ConfigOverrides::default()
    };

    let config = apply_overrides(file, &overrides).expect("overrides should apply");
    assert_eq!(config.index_url(), "https://example.test/simple");
    assert_eq!(config.channel, "stable");
    assert_eq!(config.delivery, Some(DeliveryKind::Wrap));
    assert_eq!(config.python.as_deref(), Some("python3.12"));
    assert_eq!(config.packager, None);
}

#[test]
fn reserved_channel_override_is_rejected() {
    let overrides = ConfigOverrides {
        channel: Some("pinned".to_string()),
        ..ConfigOverrides::default()
    };
    let err = apply_overrides(HoistConfig::default(), &overrides).expect_err("must reject");
    assert!(format!("{err:#}").contains("reserved"));
}

#[test]
fn load_config_defaults_when_missing_and_reports_invalid_files() {
    let dir = test_dir();
    let path = dir.join("config.toml");
    assert_eq!(
        load_config(&path).expect("missing config is fine"),
        HoistConfig::default()
    );

    std::fs::write(&path, "install_timeout_minutes = 0\n").expect("must write config");
    let err = load_config(&path).expect_err("zero timeout must fail");
    let message = format!("{err:#}");
    assert!(message.contains("invalid configuration"));
    assert!(message.contains("install_timeout_minutes"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "Installed tox 4.0"),
        "Installed tox 4.0"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "Installed tox 4.0"),
        "[OK] Installed tox 4.0"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "tox is not installed"),
        "[WARN] tox is not installed"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "step", "tox 4.0 is already installed"),
        "[..] tox 4.0 is already installed"
    );
}

#[test]
fn output_style_needs_a_terminal_and_no_opt_out() {
    assert_eq!(output_style_for(true, false), OutputStyle::Rich);
    assert_eq!(output_style_for(true, true), OutputStyle::Plain);
    assert_eq!(output_style_for(false, false), OutputStyle::Plain);
}

#[test]
fn install_lines_reflect_outcome() {
    let installed_line = format_install_line(
        &InstallOutcome::Installed(installed("4.0")),
        false,
        None,
        OutputStyle::Rich,
    );
    assert_eq!(installed_line, "[OK] Installed tox 4.0");

    let noop_line = format_install_line(
        &InstallOutcome::AlreadyInstalled(installed("4.0")),
        true,
        Some("pypi"),
        OutputStyle::Plain,
    );
    assert_eq!(
        noop_line,
        "tox 4.0 is already installed (as venv symlink, channel: latest)"
    );
}

#[test]
fn check_lines_describe_each_status() {
    let up_to_date = format_check_line(&CheckStatus::UpToDate(installed("4.0")), OutputStyle::Plain);
    assert_eq!(up_to_date, "tox 4.0 is up to date");

    let upgrade = format_check_line(
        &CheckStatus::UpgradeAvailable {
            current: installed("4.0"),
            desired: installed("4.1"),
        },
        OutputStyle::Rich,
    );
    assert_eq!(upgrade, "[WARN] tox 4.0 installed, latest 4.1 available");

    let missing = format_check_line(
        &CheckStatus::NotInstalled {
            desired: installed("4.1"),
        },
        OutputStyle::Plain,
    );
    assert_eq!(missing, "tox is not installed, latest 4.1 available");

    let problem = format_check_line(
        &CheckStatus::Problem(VersionRecord::invalid(
            "tox",
            "can't determine latest version from 'https://x'",
        )),
        OutputStyle::Rich,
    );
    assert_eq!(
        problem,
        "[ERR] tox: can't determine latest version from 'https://x'"
    );
}

#[test]
fn uninstall_lines_list_removed_entry_points() {
    let removed = UninstallResult {
        name: "tox".to_string(),
        version: Some("4.0".to_string()),
        status: UninstallStatus::Uninstalled,
        removed_entry_points: vec!["tox".to_string(), "tox-quickstart".to_string()],
    };
    assert_eq!(
        format_uninstall_line(&removed, OutputStyle::Plain),
        "Uninstalled tox 4.0 (removed: tox, tox-quickstart)"
    );

    let absent = UninstallResult {
        name: "black".to_string(),
        version: None,
        status: UninstallStatus::NotInstalled,
        removed_entry_points: Vec::new(),
    };
    assert_eq!(
        format_uninstall_line(&absent, OutputStyle::Rich),
        "[WARN] black is not installed"
    );
}

#[test]
fn cleanup_line_counts_deletions() {
    let nothing = CleanupReport::default();
    assert_eq!(
        format_cleanup_line("tox", &nothing, OutputStyle::Plain),
        "tox: nothing to clean up"
    );

    let report = CleanupReport {
        deleted: vec![PathBuf::from("/m/tox/tox-3.0"), PathBuf::from("/m/tox/tox-2.0")],
        removed_record_dropped: false,
    };
    assert_eq!(
        format_cleanup_line("tox", &report, OutputStyle::Plain),
        "tox: deleted 2 old installs"
    );
}

#[test]
fn list_lines_show_each_installed_package() {
    assert_eq!(
        format_list_lines(&[], false, None, OutputStyle::Plain),
        vec!["No packages installed"]
    );

    let lines = format_list_lines(&[installed("4.0")], true, None, OutputStyle::Plain);
    assert_eq!(
        lines,
        vec!["tox 4.0 (as venv symlink, channel: latest, source: pypi)"]
    );

    let rich = format_list_lines(&[installed("4.0")], false, None, OutputStyle::Rich);
    assert_eq!(rich.len(), 2);
    assert!(rich[0].contains("== Installed =="));
    assert_eq!(rich[1], "tox 4.0");
}

#[test]
fn completion_shell_resolution_prefers_explicit_then_env() {
    assert_eq!(
        resolve_completion_shell(Some(CliCompletionShell::Fish), Some("/bin/zsh")),
        CliCompletionShell::Fish
    );
    assert_eq!(
        resolve_completion_shell(None, Some("/usr/bin/zsh")),
        CliCompletionShell::Zsh
    );
    assert_eq!(
        resolve_completion_shell(None, Some("pwsh")),
        CliCompletionShell::Powershell
    );
    assert_eq!(
        resolve_completion_shell(None, Some("/bin/tcsh")),
        CliCompletionShell::Bash
    );
    assert_eq!(resolve_completion_shell(None, None), CliCompletionShell::Bash);
}

#[test]
fn bash_completions_mention_subcommands() {
    let mut output = Vec::new();
    write_completions_script(CliCompletionShell::Bash, &mut output)
        .expect("must write completions");
    let script = String::from_utf8(output).expect("completions must be utf-8");
    assert!(script.contains("hoist"));
    assert!(script.contains("auto-upgrade"));
    assert!(script.contains("uninstall"));
}
