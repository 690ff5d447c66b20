/// Interpreter a package is built and run with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRuntime {
    pub program: String,
    /// Chosen by configuration rather than defaulted.
    pub explicit: bool,
}

pub const DEFAULT_PYTHON: &str = "python3";

impl TargetRuntime {
    pub fn default_python() -> Self {
        Self {
            program: DEFAULT_PYTHON.to_string(),
            explicit: false,
        }
    }

    /// Shebang for produced executables. Universal wheels built with the
    /// default runtime can run on any `python` found on PATH.
    pub fn shebang(&self, universal: bool) -> String {
        if !self.explicit && universal {
            return "/usr/bin/env python".to_string();
        }
        if std::path::Path::new(&self.program).is_absolute() {
            return self.program.clone();
        }
        format!("/usr/bin/env {}", self.program)
    }
}

pub trait RuntimeSelector {
    fn target_runtime(&self, package: &str) -> TargetRuntime;
}

/// Uses the configured interpreter for every package, `python3` otherwise.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredRuntime {
    python: Option<String>,
}

impl ConfiguredRuntime {
    pub fn new(python: Option<String>) -> Self {
        Self {
            python: python
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        }
    }
}

impl RuntimeSelector for ConfiguredRuntime {
    fn target_runtime(&self, _package: &str) -> TargetRuntime {
        match &self.python {
            Some(program) => TargetRuntime {
                program: program.clone(),
                explicit: true,
            },
            None => TargetRuntime::default_python(),
        }
    }
}
