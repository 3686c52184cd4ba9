// Extension module descriptions and the per-build extension map

use crate::error::ResolveError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the compiled artifact is loaded as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionKind {
    /// Importable interpreter extension module
    #[default]
    Module,
    /// Plain shared library other extensions link against
    Library,
}

/// One compiled extension as declared in extbuild.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSpec {
    /// Fully-qualified dotted module path (e.g., "spam.eggs")
    pub name: String,

    /// C/C++ sources, in compile order
    pub sources: Vec<String>,

    /// Build against the stable ABI so one artifact serves several interpreter versions
    #[serde(default, rename = "py_limited_api")]
    pub limited_api: bool,

    #[serde(default)]
    pub kind: ExtensionKind,

    /// Links against another Library-kind extension of the same project
    #[serde(default, skip_serializing_if = "is_false")]
    pub links_to_dynamic: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_dirs: Vec<String>,

    /// Preprocessor macros as (name, optional value)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub define_macros: Vec<(String, Option<String>)>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub library_dirs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_compile_args: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_link_args: Vec<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ExtensionSpec {
    pub fn new<N, I, S>(name: N, sources: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            sources: sources.into_iter().map(Into::into).collect(),
            limited_api: false,
            kind: ExtensionKind::Module,
            links_to_dynamic: false,
            include_dirs: Vec::new(),
            define_macros: Vec::new(),
            libraries: Vec::new(),
            library_dirs: Vec::new(),
            extra_compile_args: Vec::new(),
            extra_link_args: Vec::new(),
        }
    }

    pub fn limited_api(mut self, limited_api: bool) -> Self {
        self.limited_api = limited_api;
        self
    }

    pub fn kind(mut self, kind: ExtensionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn links_to_dynamic(mut self, links_to_dynamic: bool) -> Self {
        self.links_to_dynamic = links_to_dynamic;
        self
    }

    /// Relative path of the artifact without any suffix ("spam.eggs" -> "spam/eggs")
    pub fn base_path(&self) -> String {
        base_path(&self.name)
    }
}

/// Split a dotted module name into a '/'-joined relative path
pub fn base_path(name: &str) -> String {
    name.split('.').collect::<Vec<_>>().join("/")
}

/// Check that a name is a dotted path of identifiers
pub fn is_valid_extension_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) if first == '_' || first.is_alphabetic() => {
                    chars.all(|c| c == '_' || c.is_alphanumeric())
                }
                _ => false,
            }
        })
}

/// Immutable name -> extension lookup for a single build invocation
#[derive(Debug, Clone, Default)]
pub struct ExtensionMap {
    extensions: Vec<ExtensionSpec>,
    index: HashMap<String, usize>,
}

impl ExtensionMap {
    pub fn builder() -> ExtensionMapBuilder {
        ExtensionMapBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionSpec> {
        self.index
            .get(name)
            .and_then(|&position| self.extensions.get(position))
    }

    /// Same as `get`, but an absent name is an error
    pub fn lookup(&self, name: &str) -> Result<&ExtensionSpec, ResolveError> {
        self.get(name)
            .ok_or_else(|| ResolveError::UnknownExtension(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Extensions in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &ExtensionSpec> {
        self.extensions.iter()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Collects extensions and validates them once in `build`
#[derive(Debug, Default)]
pub struct ExtensionMapBuilder {
    extensions: Vec<ExtensionSpec>,
}

impl ExtensionMapBuilder {
    pub fn extension(mut self, spec: ExtensionSpec) -> Self {
        self.extensions.push(spec);
        self
    }

    pub fn extensions<I: IntoIterator<Item = ExtensionSpec>>(mut self, specs: I) -> Self {
        self.extensions.extend(specs);
        self
    }

    pub fn build(self) -> Result<ExtensionMap, ResolveError> {
        let mut index = HashMap::with_capacity(self.extensions.len());

        for (position, spec) in self.extensions.iter().enumerate() {
            if !is_valid_extension_name(&spec.name) {
                return Err(ResolveError::InvalidName(spec.name.clone()));
            }
            if index.insert(spec.name.clone(), position).is_some() {
                return Err(ResolveError::DuplicateExtension(spec.name.clone()));
            }
        }

        Ok(ExtensionMap {
            extensions: self.extensions,
            index,
        })
    }
}
