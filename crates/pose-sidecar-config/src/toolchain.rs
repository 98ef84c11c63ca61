//! Locations of the worker's runtime, entry point and installer inputs.

use std::path::{Path, PathBuf};

use crate::Config;
use crate::error::ConfigError;

/// Where the worker lives and which runtime executes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    worker_dir: PathBuf,
    entry_point: PathBuf,
    venv_dir: PathBuf,
    system_runtime: PathBuf,
    requirements: PathBuf,
    library: String,
}

impl Toolchain {
    /// Validates the toolchain fields of `config`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let worker_dir = config.worker_dir.as_std_path().to_path_buf();
        Ok(Self {
            entry_point: worker_dir.join(non_empty("worker_entry", &config.worker_entry)?),
            venv_dir: worker_dir.join(non_empty("venv_dir", &config.venv_dir)?),
            system_runtime: PathBuf::from(non_empty("system_runtime", &config.system_runtime)?),
            requirements: worker_dir.join(non_empty(
                "requirements_file",
                &config.requirements_file,
            )?),
            library: non_empty("required_library", &config.required_library)?.to_owned(),
            worker_dir,
        })
    }

    /// Builds a toolchain from explicit parts.
    #[must_use]
    pub fn new(
        worker_dir: impl Into<PathBuf>,
        entry: impl AsRef<Path>,
        system_runtime: impl Into<PathBuf>,
        library: impl Into<String>,
    ) -> Self {
        let worker_dir = worker_dir.into();
        Self {
            entry_point: worker_dir.join(entry),
            venv_dir: worker_dir.join("venv"),
            requirements: worker_dir.join("requirements.txt"),
            system_runtime: system_runtime.into(),
            library: library.into(),
            worker_dir,
        }
    }

    /// Project directory of the worker.
    #[must_use]
    pub fn worker_dir(&self) -> &Path {
        self.worker_dir.as_path()
    }

    /// Worker entry script.
    #[must_use]
    pub fn entry_point(&self) -> &Path {
        self.entry_point.as_path()
    }

    /// Project-local isolated environment.
    #[must_use]
    pub fn venv_dir(&self) -> &Path {
        self.venv_dir.as_path()
    }

    /// Runtime executable inside the isolated environment.
    #[must_use]
    pub fn venv_runtime(&self) -> PathBuf {
        if cfg!(windows) {
            self.venv_dir.join("Scripts").join("python.exe")
        } else {
            self.venv_dir.join("bin").join("python")
        }
    }

    /// System-wide runtime executable.
    #[must_use]
    pub fn system_runtime(&self) -> &Path {
        self.system_runtime.as_path()
    }

    /// Requirements descriptor for the package installer.
    #[must_use]
    pub fn requirements(&self) -> &Path {
        self.requirements.as_path()
    }

    /// Library whose import proves the prerequisites are present.
    #[must_use]
    pub fn library(&self) -> &str {
        self.library.as_str()
    }
}

fn non_empty<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyPath { field });
    }
    Ok(trimmed)
}
