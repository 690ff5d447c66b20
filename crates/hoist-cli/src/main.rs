use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use hoist_core::{DeliveryKind, PackagerKind};

mod completion;
mod dispatch;
mod render;

use completion::CliCompletionShell;
use render::{colorize, current_output_style, error_style, OutputStyle};

#[derive(Parser, Debug)]
#[command(name = "hoist", version)]
#[command(about = "Install python CLIs into a bin folder, each in its own environment", long_about = None)]
struct Cli {
    /// Folder entry points are delivered into.
    #[arg(long, global = true, env = "HOIST_BASE")]
    base: Option<PathBuf>,
    /// Package index to resolve versions from. `{name}` is replaced by the package name.
    #[arg(long, global = true)]
    index: Option<String>,
    #[arg(long, global = true)]
    channel: Option<String>,
    #[arg(long, global = true, value_parser = parse_delivery)]
    delivery: Option<DeliveryKind>,
    #[arg(long, global = true, value_parser = parse_packager)]
    packager: Option<PackagerKind>,
    /// Interpreter used to build and run packages.
    #[arg(long, global = true)]
    python: Option<String>,
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', global = true, action = ArgAction::Count)]
    log_verbosity: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install or upgrade packages.
    Install {
        #[arg(long)]
        force: bool,
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Report whether installed packages are up to date.
    Check { packages: Vec<String> },
    /// Upgrade a package in the background, skipping when another upgrade is running.
    AutoUpgrade { package: String },
    Uninstall {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    List {
        #[arg(long)]
        verbose: bool,
    },
    /// Delete old installed versions without installing anything.
    Cleanup {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Print the effective configuration.
    Config,
    /// Print a shell completion script. Defaults to the shell named by $SHELL.
    Completions {
        #[arg(value_enum)]
        shell: Option<CliCompletionShell>,
    },
}

fn parse_delivery(value: &str) -> Result<DeliveryKind, String> {
    DeliveryKind::parse(value)
        .ok_or_else(|| format!("unknown delivery '{value}' (expected symlink, copy or wrap)"))
}

fn parse_packager(value: &str) -> Result<PackagerKind, String> {
    PackagerKind::parse(value)
        .ok_or_else(|| format!("unknown packager '{value}' (expected venv or pex)"))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("HOIST_LOG").unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "hoist={level},hoist_core={level},hoist_installer={level},hoist_resolver={level}"
        ))
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_verbosity);

    match dispatch::run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let prefix = match current_output_style() {
                OutputStyle::Plain => "error:".to_string(),
                OutputStyle::Rich => colorize(error_style(), "error:"),
            };
            eprintln!("{prefix} {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests;
