// Manifest parser - extbuild.json

use crate::extension::{ExtensionMap, ExtensionSpec};
use crate::toolchain::HostToolchain;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Default manifest filename
pub const MANIFEST_FILE: &str = "extbuild.json";

/// Main manifest structure (extbuild.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub ext_modules: Vec<ExtensionSpec>,

    #[serde(default)]
    pub build: BuildOptions,

    /// Pinned toolchain, used instead of probing an interpreter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<HostToolchain>,
}

/// Output directory layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    #[serde(default = "default_build_base")]
    pub build_base: String,

    /// Where finished artifacts go (default: {build_base}/lib)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_lib: Option<String>,

    /// Where object files go (default: {build_base}/temp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_temp: Option<String>,
}

fn default_build_base() -> String {
    "build".to_string()
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            build_base: default_build_base(),
            build_lib: None,
            build_temp: None,
        }
    }
}

impl BuildOptions {
    pub fn build_base(&self) -> PathBuf {
        PathBuf::from(&self.build_base)
    }

    pub fn build_lib(&self) -> PathBuf {
        self.build_lib
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.build_base().join("lib"))
    }

    pub fn build_temp(&self) -> PathBuf {
        self.build_temp
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.build_base().join("temp"))
    }

    /// Reject layouts that would point at the project root or escape it
    pub fn validate(&self) -> Result<()> {
        let dirs = [
            ("build_base", Some(&self.build_base)),
            ("build_lib", self.build_lib.as_ref()),
            ("build_temp", self.build_temp.as_ref()),
        ];

        for (key, dir) in dirs {
            if let Some(dir) = dir {
                if !is_safe_build_dir(Path::new(dir)) {
                    anyhow::bail!("Invalid {}: {:?}", key, dir);
                }
            }
        }

        Ok(())
    }
}

/// A build directory needs a named component and no `..`
fn is_safe_build_dir(dir: &Path) -> bool {
    let components: Vec<Component> = dir.components().collect();

    !components.contains(&Component::ParentDir)
        && components
            .iter()
            .any(|component| matches!(component, Component::Normal(_)))
}

impl Manifest {
    /// Parse extbuild.json from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        Self::from_str(&content)
    }

    /// Parse extbuild.json from string
    pub fn from_str(content: &str) -> Result<Self> {
        let manifest: Manifest =
            serde_json::from_str(content).context("Failed to parse extbuild.json")?;

        manifest.validate()?;
        Ok(manifest)
    }

    /// Write manifest to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Build the extension map for one build invocation
    pub fn extension_map(&self) -> Result<ExtensionMap> {
        let map = ExtensionMap::builder()
            .extensions(self.ext_modules.iter().cloned())
            .build()?;
        Ok(map)
    }

    /// Validate manifest
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Package name cannot be empty");
        }

        if self.version.trim().is_empty() {
            anyhow::bail!("Package version cannot be empty");
        }

        self.build.validate()?;

        for ext in &self.ext_modules {
            if ext.sources.is_empty() {
                anyhow::bail!("Extension '{}' has no sources", ext.name);
            }
        }

        // Rejects malformed and duplicate extension names
        self.extension_map()?;

        Ok(())
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            name: "my-package".to_string(),
            version: "0.1.0".to_string(),
            description: Some("A project with compiled extensions".to_string()),
            ext_modules: vec![ExtensionSpec::new("my_package._native", ["src/native.c"])],
            build: BuildOptions::default(),
            toolchain: None,
        }
    }
}
