// extbuild-core - compiled extension filename resolution and build planning

pub mod build;
pub mod config;
pub mod error;
pub mod extension;
pub mod manifest;
pub mod platform;
pub mod resolver;
pub mod toolchain;

pub use build::{clean_build, BuildCommand, CompileStep, PLAN_FILE};
pub use config::{BuildConfig, EXT_SUFFIX_ENV};
pub use error::{BuildError, ResolveError};
pub use extension::{ExtensionKind, ExtensionMap, ExtensionMapBuilder, ExtensionSpec};
pub use manifest::{BuildOptions, Manifest, MANIFEST_FILE};
pub use platform::{platform_display_name, Platform};
pub use resolver::{resolve, FilenameResolver};
pub use toolchain::{HostToolchain, Implementation};
