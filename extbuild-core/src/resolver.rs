// Extension filename resolution
//
// Suffix priority for a known extension:
// 1. stable-ABI suffix (limited API extension on an interpreter that has one)
// 2. override suffix from EXTBUILD_EXT_SUFFIX
// 3. the toolchain's standard suffix

use crate::error::ResolveError;
use crate::extension::{ExtensionKind, ExtensionMap};
use crate::platform::Platform;
use crate::toolchain::HostToolchain;

/// Resolve the relative artifact filename for `name`
///
/// An empty `abi3_suffix` counts as "no stable ABI on this interpreter"; an empty
/// `override_suffix` counts as no override.
pub fn resolve(
    name: &str,
    extensions: &ExtensionMap,
    abi3_suffix: Option<&str>,
    override_suffix: Option<&str>,
    ext_suffix: &str,
) -> Result<String, ResolveError> {
    let spec = extensions.lookup(name)?;
    let abi3_suffix = abi3_suffix.filter(|suffix| !suffix.is_empty());
    let override_suffix = override_suffix.filter(|suffix| !suffix.is_empty());

    let suffix = match (spec.limited_api, abi3_suffix, override_suffix) {
        (true, Some(abi3), _) => abi3,
        (_, _, Some(forced)) => forced,
        _ => ext_suffix,
    };

    let filename = format!("{}{}", spec.base_path(), suffix);
    log::debug!("Resolved {} -> {}", name, filename);

    Ok(filename)
}

/// Filename resolution bound to one toolchain, platform and override
#[derive(Debug, Clone)]
pub struct FilenameResolver<'a> {
    extensions: &'a ExtensionMap,
    toolchain: &'a HostToolchain,
    platform: &'a Platform,
    override_suffix: Option<&'a str>,
    use_stubs: bool,
}

impl<'a> FilenameResolver<'a> {
    pub fn new(
        extensions: &'a ExtensionMap,
        toolchain: &'a HostToolchain,
        platform: &'a Platform,
        override_suffix: Option<&'a str>,
    ) -> Self {
        Self {
            extensions,
            toolchain,
            platform,
            override_suffix,
            use_stubs: platform.uses_stubs(),
        }
    }

    /// Force "dl-" stub naming on or off regardless of platform
    pub fn use_stubs(mut self, use_stubs: bool) -> Self {
        self.use_stubs = use_stubs;
        self
    }

    /// Final artifact filename, including library and stub naming
    pub fn filename(&self, name: &str) -> Result<String, ResolveError> {
        let filename = resolve(
            name,
            self.extensions,
            self.toolchain.abi3_suffix(),
            self.override_suffix,
            &self.toolchain.ext_suffix,
        )?;
        let spec = self.extensions.lookup(name)?;

        match spec.kind {
            ExtensionKind::Library => Ok(self.platform.shared_library_filename(&filename)),
            ExtensionKind::Module if self.use_stubs && spec.links_to_dynamic => {
                Ok(stub_filename(&filename))
            }
            ExtensionKind::Module => Ok(filename),
        }
    }
}

/// Prefix the file name component with "dl-"
fn stub_filename(filename: &str) -> String {
    match filename.rfind('/') {
        Some(pos) => {
            let (dir, file) = filename.split_at(pos + 1);
            format!("{}dl-{}", dir, file)
        }
        None => format!("dl-{}", filename),
    }
}
