// Host interpreter toolchain: extension suffixes and stable-ABI support

use crate::platform::Platform;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::process::Command;

/// Script run by the interpreter to report its extension configuration
const PROBE_SCRIPT: &str = "import importlib.machinery, json, sys, sysconfig; \
print(json.dumps({\
'implementation': sys.implementation.name, \
'ext_suffix': sysconfig.get_config_var('EXT_SUFFIX') or '', \
'extension_suffixes': importlib.machinery.EXTENSION_SUFFIXES}))";

/// Interpreter implementation the extensions are built for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Implementation {
    CPython,
    PyPy,
    Other(String),
}

impl From<String> for Implementation {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "cpython" => Implementation::CPython,
            "pypy" => Implementation::PyPy,
            _ => Implementation::Other(name),
        }
    }
}

impl From<Implementation> for String {
    fn from(implementation: Implementation) -> Self {
        implementation.to_string()
    }
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Implementation::CPython => write!(f, "cpython"),
            Implementation::PyPy => write!(f, "pypy"),
            Implementation::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Extension naming facts reported by (or assumed for) the target interpreter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostToolchain {
    pub implementation: Implementation,

    /// Standard suffix for version-specific builds (e.g., ".cpython-311-x86_64-linux-gnu.so")
    pub ext_suffix: String,

    /// Every suffix the interpreter's import system accepts, in preference order
    #[serde(default)]
    pub extension_suffixes: Vec<String>,
}

impl HostToolchain {
    pub fn new(
        implementation: Implementation,
        ext_suffix: impl Into<String>,
        extension_suffixes: Vec<String>,
    ) -> Self {
        Self {
            implementation,
            ext_suffix: ext_suffix.into(),
            extension_suffixes,
        }
    }

    /// Assume a CPython-shaped toolchain for the platform without running an interpreter
    pub fn detect(platform: &Platform) -> Self {
        if platform.is_windows() {
            Self::new(Implementation::CPython, ".pyd", vec![".pyd".to_string()])
        } else {
            Self::new(
                Implementation::CPython,
                ".so",
                vec![".abi3.so".to_string(), ".so".to_string()],
            )
        }
    }

    /// Run the interpreter and read its extension configuration
    pub fn probe<P: AsRef<Path>>(interpreter: P) -> Result<Self> {
        let interpreter = interpreter.as_ref();
        let executable = which::which(interpreter)
            .with_context(|| format!("Interpreter not found: {}", interpreter.display()))?;

        log::debug!("Probing toolchain: {}", executable.display());

        let output = Command::new(&executable)
            .arg("-c")
            .arg(PROBE_SCRIPT)
            .output()
            .with_context(|| format!("Failed to run {}", executable.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Toolchain probe failed ({}):\n{}",
                executable.display(),
                stderr
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let toolchain: HostToolchain = serde_json::from_str(stdout.trim())
            .with_context(|| format!("Malformed probe output from {}", executable.display()))?;

        Ok(toolchain)
    }

    /// Suffix for stable-ABI builds, if this interpreter supports one
    pub fn abi3_suffix(&self) -> Option<&str> {
        self.extension_suffixes
            .iter()
            .map(String::as_str)
            .find(|suffix| suffix.contains(".abi3") || *suffix == ".pyd")
    }

    pub fn supports_limited_api(&self) -> bool {
        self.abi3_suffix().is_some()
    }
}
