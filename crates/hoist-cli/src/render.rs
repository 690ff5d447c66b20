use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use hoist_core::VersionRecord;
use hoist_installer::{CheckStatus, CleanupReport, InstallOutcome, UninstallResult, UninstallStatus};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    output_style_for(
        std::io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some(),
    )
}

pub(crate) fn output_style_for(is_terminal: bool, no_color: bool) -> OutputStyle {
    if is_terminal && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

pub(crate) fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn error_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

pub(crate) fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

pub(crate) fn format_install_line(
    outcome: &InstallOutcome,
    verbose: bool,
    index: Option<&str>,
    style: OutputStyle,
) -> String {
    let status = match outcome {
        InstallOutcome::Installed(_) => "ok",
        InstallOutcome::AlreadyInstalled(_) => "step",
    };
    render_status_line(style, status, &outcome.summary(verbose, index))
}

pub(crate) fn format_check_line(status: &CheckStatus, style: OutputStyle) -> String {
    match status {
        CheckStatus::UpToDate(current) => render_status_line(
            style,
            "ok",
            &format!("{} {} is up to date", current.name, current.version),
        ),
        CheckStatus::UpgradeAvailable { current, desired } => render_status_line(
            style,
            "warn",
            &format!(
                "{} {} installed, {} {} available",
                current.name, current.version, desired.channel, desired.version
            ),
        ),
        CheckStatus::NotInstalled { desired } => render_status_line(
            style,
            "step",
            &format!(
                "{} is not installed, {} {} available",
                desired.name, desired.channel, desired.version
            ),
        ),
        CheckStatus::Problem(record) => render_status_line(style, "err", &record.to_string()),
    }
}

pub(crate) fn format_uninstall_line(result: &UninstallResult, style: OutputStyle) -> String {
    match result.status {
        UninstallStatus::NotInstalled => {
            render_status_line(style, "warn", &format!("{} is not installed", result.name))
        }
        UninstallStatus::Uninstalled => {
            let mut message = match &result.version {
                Some(version) => format!("Uninstalled {} {version}", result.name),
                None => format!("Uninstalled {}", result.name),
            };
            if !result.removed_entry_points.is_empty() {
                message.push_str(&format!(
                    " (removed: {})",
                    result.removed_entry_points.join(", ")
                ));
            }
            render_status_line(style, "ok", &message)
        }
    }
}

pub(crate) fn format_cleanup_line(package: &str, report: &CleanupReport, style: OutputStyle) -> String {
    let message = match report.deleted.len() {
        0 => format!("{package}: nothing to clean up"),
        1 => format!("{package}: deleted 1 old install"),
        count => format!("{package}: deleted {count} old installs"),
    };
    render_status_line(style, "ok", &message)
}

pub(crate) fn format_list_lines(
    records: &[VersionRecord],
    verbose: bool,
    index: Option<&str>,
    style: OutputStyle,
) -> Vec<String> {
    if records.is_empty() {
        return vec!["No packages installed".to_string()];
    }

    let mut lines = Vec::with_capacity(records.len() + 1);
    if style == OutputStyle::Rich {
        lines.push(colorize(section_style(), "== Installed =="));
    }
    lines.extend(
        records
            .iter()
            .map(|record| record.representation(verbose, None, index)),
    );
    lines
}
