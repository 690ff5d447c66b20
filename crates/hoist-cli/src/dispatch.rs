use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use hoist_core::{DeliveryKind, HoistConfig, PackagerKind, RecordRole};
use hoist_installer::{
    default_base, installed_packages, load_record, AutoUpgradeOutcome, CheckStatus,
    ConfiguredRuntime, InstallLayout, Installer, RemoveOccupant, SystemBuilder,
};
use hoist_resolver::PypiResolver;
use tracing::debug;

use crate::completion::{resolve_completion_shell, write_completions_script};
use crate::render::{
    current_output_style, format_check_line, format_cleanup_line, format_install_line,
    format_list_lines, format_uninstall_line, print_lines,
};
use crate::{Cli, Commands};

/// Command-line values that take precedence over `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ConfigOverrides {
    pub(crate) index: Option<String>,
    pub(crate) channel: Option<String>,
    pub(crate) delivery: Option<DeliveryKind>,
    pub(crate) packager: Option<PackagerKind>,
    pub(crate) python: Option<String>,
}

impl ConfigOverrides {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            index: cli.index.clone(),
            channel: cli.channel.clone(),
            delivery: cli.delivery,
            packager: cli.packager,
            python: cli.python.clone(),
        }
    }
}

/// Reads `config.toml`; a missing file means defaults.
pub(crate) fn load_config(path: &Path) -> Result<HoistConfig> {
    match fs::read_to_string(path) {
        Ok(raw) => HoistConfig::from_toml_str(&raw)
            .with_context(|| format!("invalid configuration: {}", path.display())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(HoistConfig::default()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read configuration: {}", path.display()))
        }
    }
}

pub(crate) fn apply_overrides(
    mut config: HoistConfig,
    overrides: &ConfigOverrides,
) -> Result<HoistConfig> {
    if let Some(index) = &overrides.index {
        config.index = Some(index.clone());
    }
    if let Some(channel) = &overrides.channel {
        config.channel = channel.clone();
    }
    if let Some(delivery) = overrides.delivery {
        config.delivery = Some(delivery);
    }
    if let Some(packager) = overrides.packager {
        config.packager = Some(packager);
    }
    if let Some(python) = &overrides.python {
        config.python = Some(python.clone());
    }
    config
        .validate()
        .context("invalid command line configuration")?;
    Ok(config)
}

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let base = match &cli.base {
        Some(base) => base.clone(),
        None => default_base()?,
    };
    let layout = InstallLayout::new(base);
    let config = apply_overrides(
        load_config(&layout.config_path())?,
        &ConfigOverrides::from_cli(&cli),
    )?;
    debug!("base folder: {}", layout.base().display());

    let output_style = current_output_style();
    let index = config.index.as_deref();

    match cli.command {
        Commands::Install { force, packages } => {
            let collaborators = Collaborators::new(&config)?;
            let installer = collaborators.installer(&layout, &config);
            for package in &packages {
                let outcome = installer.install(package, force)?;
                println!("{}", format_install_line(&outcome, false, index, output_style));
            }
        }
        Commands::Check { packages } => {
            let packages = if packages.is_empty() {
                installed_packages(&layout)?
            } else {
                packages
            };
            if packages.is_empty() {
                println!("No packages installed");
                return Ok(());
            }

            let collaborators = Collaborators::new(&config)?;
            let installer = collaborators.installer(&layout, &config);
            let mut problems = 0usize;
            for package in &packages {
                let status = installer.check(package)?;
                if matches!(status, CheckStatus::Problem(_)) {
                    problems += 1;
                }
                println!("{}", format_check_line(&status, output_style));
            }
            if problems > 0 {
                return Err(anyhow!(
                    "could not determine the desired version of {problems} package(s)"
                ));
            }
        }
        Commands::AutoUpgrade { package } => {
            let collaborators = Collaborators::new(&config)?;
            let installer = collaborators.installer(&layout, &config);
            match installer.auto_upgrade(&package)? {
                AutoUpgradeOutcome::Skipped => {
                    debug!("auto-upgrade of {package} skipped");
                }
                AutoUpgradeOutcome::Finished(outcome) => {
                    println!("{}", format_install_line(&outcome, false, index, output_style));
                }
            }
        }
        Commands::Uninstall { packages } => {
            let collaborators = Collaborators::new(&config)?;
            let installer = collaborators.installer(&layout, &config);
            for package in &packages {
                let result = installer.uninstall(package)?;
                println!("{}", format_uninstall_line(&result, output_style));
            }
        }
        Commands::List { verbose } => {
            let records = installed_packages(&layout)?
                .iter()
                .map(|name| load_record(&layout, name, RecordRole::Current))
                .collect::<Vec<_>>();
            print_lines(&format_list_lines(&records, verbose, index, output_style));
        }
        Commands::Cleanup { packages } => {
            let collaborators = Collaborators::new(&config)?;
            let installer = collaborators.installer(&layout, &config);
            for package in &packages {
                let report = installer.cleanup(package)?;
                println!("{}", format_cleanup_line(package, &report, output_style));
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
        Commands::Completions { shell } => {
            let shell = resolve_completion_shell(shell, std::env::var("SHELL").ok().as_deref());
            let mut stdout = io::stdout();
            write_completions_script(shell, &mut stdout)?;
        }
    }

    Ok(())
}

/// Production implementations of the installer's collaborators.
struct Collaborators {
    resolver: PypiResolver,
    builder: SystemBuilder,
    runtime: ConfiguredRuntime,
    occupant: RemoveOccupant,
}

impl Collaborators {
    fn new(config: &HoistConfig) -> Result<Self> {
        Ok(Self {
            resolver: PypiResolver::new()?,
            builder: SystemBuilder,
            runtime: ConfiguredRuntime::new(config.python.clone()),
            occupant: RemoveOccupant,
        })
    }

    fn installer<'a>(&'a self, layout: &'a InstallLayout, config: &'a HoistConfig) -> Installer<'a> {
        let installer = Installer::new(
            layout,
            config,
            &self.resolver,
            &self.builder,
            &self.runtime,
            &self.occupant,
        );
        match std::env::current_exe() {
            Ok(program) => installer.with_hoist_program(program),
            Err(err) => {
                debug!("can't locate the hoist executable for wrappers: {err}");
                installer
            }
        }
    }
}
