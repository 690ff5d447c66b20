use anyhow::{anyhow, Context, Result};
use hoist_core::{EntryPointSet, PackagerKind};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::fs_utils::remove_path_if_exists;
use crate::runtime::TargetRuntime;

/// Everything a builder needs to produce one package version.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub package: &'a str,
    pub version: &'a str,
    pub index: &'a str,
    pub packager: PackagerKind,
    pub runtime: &'a TargetRuntime,
    /// Scratch folder artifacts are produced in.
    pub build_dir: &'a Path,
    /// Folder the artifacts will be moved to once the build succeeds.
    pub destination_dir: &'a Path,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    /// Produced artifacts, all inside the build folder.
    pub artifacts: Vec<PathBuf>,
    pub entry_points: EntryPointSet,
}

pub trait PackageBuilder {
    fn build(&self, request: &BuildRequest<'_>) -> Result<BuildOutput>;
}

/// Builds with the system's python tooling: `pip wheel` first, then either a
/// virtualenv or one pex per entry point.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBuilder;

impl PackageBuilder for SystemBuilder {
    fn build(&self, request: &BuildRequest<'_>) -> Result<BuildOutput> {
        fs::create_dir_all(request.build_dir)
            .with_context(|| format!("failed to create {}", request.build_dir.display()))?;

        pip_wheel(request)?;
        let entry_points = wheel_entry_points(request.build_dir, request.package, request.version)?;
        if entry_points.is_empty() {
            return Ok(BuildOutput::default());
        }

        let artifacts = match request.packager {
            PackagerKind::Venv => vec![build_venv(request)?],
            PackagerKind::Pex => build_pex(request, &entry_points)?,
        };
        Ok(BuildOutput {
            artifacts,
            entry_points,
        })
    }
}

/// Index to hand to pip. JSON API templates are not pip indexes, pip's own
/// default is used for those.
pub fn pip_index(index: &str) -> Option<&str> {
    if index.contains("{name}") {
        None
    } else {
        Some(index)
    }
}

fn requirement(request: &BuildRequest<'_>) -> String {
    format!("{}=={}", request.package, request.version)
}

fn pip_wheel(request: &BuildRequest<'_>) -> Result<()> {
    let mut command = Command::new(&request.runtime.program);
    command.args(["-m", "pip", "wheel"]);
    if let Some(index) = pip_index(request.index) {
        command.arg("-i").arg(index);
    }
    command
        .arg("--cache-dir")
        .arg(request.build_dir.join(".cache"))
        .arg("--wheel-dir")
        .arg(request.build_dir)
        .arg(requirement(request));
    debug!("running pip wheel for {}", requirement(request));
    run_command(&mut command, "pip wheel failed")
}

fn build_venv(request: &BuildRequest<'_>) -> Result<PathBuf> {
    let folder_name = format!("{}-{}", request.package, request.version);
    let folder = request.build_dir.join(&folder_name);
    remove_path_if_exists(&folder)
        .with_context(|| format!("failed to clear {}", folder.display()))?;

    let mut command = Command::new(&request.runtime.program);
    command.args(["-m", "venv"]).arg(&folder);
    run_command(&mut command, "venv creation failed")?;

    let mut command = Command::new(folder.join("bin").join("pip"));
    command.arg("install");
    if let Some(index) = pip_index(request.index) {
        command.arg("-i").arg(index);
    }
    command
        .arg("-f")
        .arg(request.build_dir)
        .arg(requirement(request));
    run_command(&mut command, "pip install failed")?;

    let destination = request.destination_dir.join(&folder_name);
    relocate_venv_scripts(&folder, &destination)?;
    Ok(folder)
}

fn build_pex(request: &BuildRequest<'_>, entry_points: &EntryPointSet) -> Result<Vec<PathBuf>> {
    let shebang = request
        .runtime
        .shebang(is_universal(request.build_dir, request.package));
    let mut artifacts = Vec::new();
    for entry_point in entry_points.names() {
        let output = request
            .build_dir
            .join(format!("{entry_point}-{}", request.version));
        remove_path_if_exists(&output)
            .with_context(|| format!("failed to clear {}", output.display()))?;

        let mut command = Command::new("pex");
        command
            .arg("--cache-dir")
            .arg(request.build_dir.join(".cache"))
            .arg("--repo")
            .arg(request.build_dir)
            .arg("-c")
            .arg(entry_point)
            .arg("-o")
            .arg(&output)
            .arg("--python-shebang")
            .arg(&shebang)
            .arg(requirement(request));
        run_command(&mut command, "pex build failed")?;
        artifacts.push(output);
    }
    Ok(artifacts)
}

fn wheel_prefixes(package: &str, version: &str) -> [String; 2] {
    [
        format!("{package}-{version}-"),
        format!("{}-{version}-", package.replace('-', "_")),
    ]
}

fn package_wheels(build_dir: &Path, package: &str, version: &str) -> Result<Vec<PathBuf>> {
    let prefixes = wheel_prefixes(package, version);
    let mut wheels = Vec::new();
    for entry in fs::read_dir(build_dir)
        .with_context(|| format!("failed to read {}", build_dir.display()))?
    {
        let entry = entry?;
        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if file_name.ends_with(".whl")
            && prefixes.iter().any(|prefix| file_name.starts_with(prefix.as_str()))
        {
            wheels.push(entry.path());
        }
    }
    wheels.sort();
    Ok(wheels)
}

/// Console scripts declared by the package's wheel in `build_dir`.
pub fn wheel_entry_points(build_dir: &Path, package: &str, version: &str) -> Result<EntryPointSet> {
    for wheel in package_wheels(build_dir, package, version)? {
        match read_wheel_entry_points(&wheel) {
            Ok(Some(entry_points)) => return Ok(entry_points),
            Ok(None) => {}
            Err(err) => warn!("can't read wheel {}: {err:#}", wheel.display()),
        }
    }
    Ok(EntryPointSet::new())
}

fn read_wheel_entry_points(wheel: &Path) -> Result<Option<EntryPointSet>> {
    let file =
        fs::File::open(wheel).with_context(|| format!("failed to open {}", wheel.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("failed to read wheel archive {}", wheel.display()))?;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read entry {index} of {}", wheel.display()))?;
        let is_entry_points = entry
            .name()
            .rsplit_once('/')
            .map(|(dir, file)| dir.ends_with(".dist-info") && file == "entry_points.txt")
            .unwrap_or(false);
        if !is_entry_points {
            continue;
        }
        let mut raw = String::new();
        entry
            .read_to_string(&mut raw)
            .with_context(|| format!("failed to read entry points from {}", wheel.display()))?;
        return Ok(Some(EntryPointSet::parse_console_scripts(&raw)));
    }
    Ok(None)
}

/// A wheel tagged `py2.py3-none-any` runs on any python.
pub fn is_universal(build_dir: &Path, package: &str) -> bool {
    let normalized = package.replace('-', "_");
    let Ok(read_dir) = fs::read_dir(build_dir) else {
        return false;
    };
    read_dir.flatten().any(|entry| {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        (file_name.starts_with(package) || file_name.starts_with(&normalized))
            && file_name.ends_with("-py2.py3-none-any.whl")
    })
}

fn relocate_venv_scripts(folder: &Path, destination: &Path) -> Result<()> {
    let bin = folder.join("bin");
    if !bin.is_dir() {
        return Ok(());
    }
    let source = folder.display().to_string();
    let target = destination.display().to_string();
    for entry in fs::read_dir(&bin).with_context(|| format!("failed to read {}", bin.display()))? {
        let path = entry?.path();
        if relocate_script(&path, &source, &target)? {
            debug!("relocated {}", path.display());
        }
    }
    Ok(())
}

/// Rewrites mentions of `source` to `destination` in a small text script.
/// Symlinks, binaries and files over 8 KiB are left untouched.
pub fn relocate_script(path: &Path, source: &str, destination: &str) -> Result<bool> {
    let metadata =
        fs::symlink_metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    if !metadata.is_file() || metadata.len() > 8192 {
        return Ok(false);
    }

    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let Ok(text) = String::from_utf8(raw) else {
        return Ok(false);
    };
    if !text.contains(source) {
        return Ok(false);
    }

    fs::write(path, text.replace(source, destination))
        .with_context(|| format!("failed to relocate {}", path.display()))?;
    Ok(true)
}

pub(crate) fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}
