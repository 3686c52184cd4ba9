// Build command: finalize options, plan compiler invocations, lay out build directories

use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::extension::{ExtensionKind, ExtensionMap, ExtensionSpec};
use crate::manifest::{BuildOptions, Manifest};
use crate::platform::Platform;
use crate::resolver::FilenameResolver;
use crate::toolchain::HostToolchain;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Plan file written under build_base by `run`
pub const PLAN_FILE: &str = "extbuild-plan.json";

/// Oldest interpreter ABI targeted by limited API builds (3.7)
const LIMITED_API_VERSION: &str = "0x03070000";

/// Everything needed to produce one extension artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileStep {
    pub extension: String,
    pub sources: Vec<PathBuf>,
    pub objects: Vec<PathBuf>,
    pub output: PathBuf,

    /// One compiler invocation per source
    pub compile_commands: Vec<Vec<String>>,
    pub link_command: Vec<String>,
}

/// The extension build command for one manifest
#[derive(Debug)]
pub struct BuildCommand {
    manifest: Manifest,
    extensions: ExtensionMap,
    toolchain: HostToolchain,
    config: BuildConfig,
    platform: Platform,
    compiler: String,
}

impl BuildCommand {
    /// Finalize options: the extension map is built here, once per invocation
    pub fn new(
        manifest: Manifest,
        toolchain: HostToolchain,
        config: BuildConfig,
        platform: Platform,
    ) -> Result<Self> {
        let extensions = manifest.extension_map()?;

        Ok(Self {
            manifest,
            extensions,
            toolchain,
            config,
            platform,
            compiler: detect_compiler(),
        })
    }

    /// Use a specific C compiler instead of the detected one
    pub fn with_compiler(mut self, compiler: impl Into<String>) -> Self {
        self.compiler = compiler.into();
        self
    }

    fn resolver(&self) -> FilenameResolver<'_> {
        FilenameResolver::new(
            &self.extensions,
            &self.toolchain,
            &self.platform,
            self.config.override_suffix.as_deref(),
        )
    }

    /// Relative artifact filename for a known extension
    pub fn ext_filename(&self, name: &str) -> Result<String, BuildError> {
        Ok(self.resolver().filename(name)?)
    }

    /// Where the finished artifact for `name` is placed
    pub fn ext_output_path(&self, project_root: &Path, name: &str) -> Result<PathBuf, BuildError> {
        let filename = self.ext_filename(name)?;
        Ok(project_root
            .join(self.manifest.build.build_lib())
            .join(filename))
    }

    /// Compute compile and link steps for every extension, in declaration order
    pub fn plan(&self, project_root: &Path) -> Result<Vec<CompileStep>, BuildError> {
        let build_temp = project_root.join(self.manifest.build.build_temp());

        self.extensions
            .iter()
            .map(|spec| self.plan_extension(project_root, &build_temp, spec))
            .collect()
    }

    fn plan_extension(
        &self,
        project_root: &Path,
        build_temp: &Path,
        spec: &ExtensionSpec,
    ) -> Result<CompileStep, BuildError> {
        let mut sources = Vec::with_capacity(spec.sources.len());
        let mut objects = Vec::with_capacity(spec.sources.len());

        for source in &spec.sources {
            let source_path = project_root.join(source);
            if !source_path.exists() {
                return Err(BuildError::MissingSource {
                    extension: spec.name.clone(),
                    path: source_path,
                });
            }

            let object = unique_object_name(Path::new(source), &objects, build_temp);
            objects.push(object);
            sources.push(source_path);
        }

        let output = self.ext_output_path(project_root, &spec.name)?;
        let use_limited_api = spec.limited_api && self.toolchain.supports_limited_api();

        let compile_commands = sources
            .iter()
            .zip(&objects)
            .map(|(source, object)| self.compile_command(spec, source, object, use_limited_api))
            .collect();
        let link_command = self.link_command(spec, &objects, &output);

        log::info!("Planned {} -> {}", spec.name, output.display());

        Ok(CompileStep {
            extension: spec.name.clone(),
            sources,
            objects,
            output,
            compile_commands,
            link_command,
        })
    }

    fn compile_command(
        &self,
        spec: &ExtensionSpec,
        source: &Path,
        object: &Path,
        use_limited_api: bool,
    ) -> Vec<String> {
        let mut command = vec![
            self.compiler.clone(),
            "-c".to_string(),
            source.display().to_string(),
            "-o".to_string(),
            object.display().to_string(),
            "-fPIC".to_string(), // Position-independent code for shared libraries
        ];

        for include_dir in &spec.include_dirs {
            command.push(format!("-I{}", include_dir));
        }

        for (name, value) in &spec.define_macros {
            match value {
                Some(value) => command.push(format!("-D{}={}", name, value)),
                None => command.push(format!("-D{}", name)),
            }
        }

        if use_limited_api {
            command.push(format!("-DPy_LIMITED_API={}", LIMITED_API_VERSION));
        }

        command.extend(spec.extra_compile_args.iter().cloned());
        command
    }

    fn link_command(&self, spec: &ExtensionSpec, objects: &[PathBuf], output: &Path) -> Vec<String> {
        let mut command = vec![self.compiler.clone()];

        match (self.platform.is_macos(), spec.kind) {
            (true, ExtensionKind::Module) => command.extend(
                ["-bundle", "-undefined", "dynamic_lookup"]
                    .iter()
                    .map(|s| s.to_string()),
            ),
            (true, ExtensionKind::Library) => command.push("-dynamiclib".to_string()),
            (false, _) => command.push("-shared".to_string()),
        }

        command.extend(objects.iter().map(|o| o.display().to_string()));

        for library_dir in &spec.library_dirs {
            command.push(format!("-L{}", library_dir));
        }

        for library in &spec.libraries {
            command.push(format!("-l{}", library));
        }

        command.extend(spec.extra_link_args.iter().cloned());
        command.push("-o".to_string());
        command.push(output.display().to_string());
        command
    }

    /// Create the build layout and write the plan file; nothing is compiled
    pub fn run(&self, project_root: &Path) -> Result<Vec<CompileStep>> {
        let steps = self.plan(project_root)?;

        let build_base = project_root.join(self.manifest.build.build_base());
        let build_lib = project_root.join(self.manifest.build.build_lib());
        let build_temp = project_root.join(self.manifest.build.build_temp());

        for dir in [&build_lib, &build_temp] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        for step in &steps {
            let parents = step
                .objects
                .iter()
                .chain(std::iter::once(&step.output))
                .filter_map(|path| path.parent());

            for parent in parents {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let plan_path = build_base.join(PLAN_FILE);
        let content = serde_json::to_string_pretty(&steps).context("Failed to serialize build plan")?;
        fs::write(&plan_path, content)
            .with_context(|| format!("Failed to write {}", plan_path.display()))?;

        log::info!(
            "Wrote build plan for {} extension(s) to {}",
            steps.len(),
            plan_path.display()
        );

        Ok(steps)
    }
}

/// Remove the build directory; returns whether anything was removed
pub fn clean_build(project_root: &Path, options: &BuildOptions) -> Result<bool> {
    options.validate()?;

    let build_base = project_root.join(options.build_base());
    if !build_base.exists() {
        return Ok(false);
    }

    // Never remove the project itself or anything above it
    let root = project_root
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", project_root.display()))?;
    let target = build_base
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", build_base.display()))?;
    if root.starts_with(&target) {
        anyhow::bail!(
            "Refusing to clean {}: it contains the project root {}",
            target.display(),
            root.display()
        );
    }

    fs::remove_dir_all(&build_base)
        .with_context(|| format!("Failed to clean {}", build_base.display()))?;
    Ok(true)
}

/// Detect compiler (clang preferred, fallback to gcc)
fn detect_compiler() -> String {
    if which::which("clang").is_ok() {
        "clang".to_string()
    } else {
        "gcc".to_string()
    }
}

/// Object file path for a source, relative to build_temp
///
/// Root, drive and `..` components are dropped so every object stays under build_temp.
fn object_name(source: &Path) -> PathBuf {
    let relative: PathBuf = source
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    relative.with_extension("o")
}

/// `object_name`, falling back to "x.cpp.o" when "x.o" is already taken
fn unique_object_name(source: &Path, taken: &[PathBuf], build_temp: &Path) -> PathBuf {
    let object = build_temp.join(object_name(source));
    if !taken.contains(&object) {
        return object;
    }

    let file_name = source
        .file_name()
        .map(|name| format!("{}.o", name.to_string_lossy()))
        .unwrap_or_else(|| "source.o".to_string());
    object.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::Implementation;

    const CPYTHON_SUFFIX: &str = ".cpython-311-x86_64-linux-gnu.so";

    fn cpython() -> HostToolchain {
        HostToolchain::new(
            Implementation::CPython,
            CPYTHON_SUFFIX,
            vec![
                CPYTHON_SUFFIX.to_string(),
                ".abi3.so".to_string(),
                ".so".to_string(),
            ],
        )
    }

    fn manifest(json: &str) -> Manifest {
        Manifest::from_str(json).unwrap()
    }

    fn project() -> (tempfile::TempDir, Manifest) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("foo.c"), "/* foo */").unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/eggs.c"), "/* eggs */").unwrap();

        let manifest = manifest(
            r#"{
                "name": "foo",
                "version": "0.0.0",
                "ext_modules": [
                    { "name": "foo", "sources": ["foo.c"], "libraries": ["m"] },
                    { "name": "spam.eggs", "sources": ["src/eggs.c"], "py_limited_api": true,
                      "define_macros": [["NDEBUG", null], ["LEVEL", "2"]] }
                ],
                "build": { "build_base": "foo_build" }
            }"#,
        );
        (dir, manifest)
    }

    fn command(manifest: Manifest, config: BuildConfig) -> BuildCommand {
        BuildCommand::new(manifest, cpython(), config, Platform::from_target("linux-x64"))
            .unwrap()
            .with_compiler("cc")
    }

    #[test]
    fn test_ext_filename_uses_override() {
        let (_dir, manifest) = project();
        let cmd = command(manifest, BuildConfig::default().with_override_suffix(".test-suffix"));

        assert_eq!(cmd.ext_filename("foo").unwrap(), "foo.test-suffix");
        assert_eq!(cmd.ext_filename("spam.eggs").unwrap(), "spam/eggs.abi3.so");
        assert!(matches!(
            cmd.ext_filename("normal"),
            Err(BuildError::Resolve(_))
        ));
    }

    #[test]
    fn test_plan_layout() {
        let (dir, manifest) = project();
        let cmd = command(manifest, BuildConfig::default());
        let root = dir.path();

        let steps = cmd.plan(root).unwrap();
        assert_eq!(steps.len(), 2);

        let foo = &steps[0];
        assert_eq!(foo.extension, "foo");
        assert_eq!(
            foo.output,
            root.join("foo_build/lib").join(format!("foo{}", CPYTHON_SUFFIX))
        );
        assert_eq!(foo.objects, vec![root.join("foo_build/temp/foo.o")]);
        assert_eq!(foo.link_command[0], "cc");
        assert_eq!(foo.link_command[1], "-shared");
        assert!(foo.link_command.contains(&"-lm".to_string()));
        assert_eq!(foo.link_command.last().unwrap(), &foo.output.display().to_string());

        let eggs = &steps[1];
        assert_eq!(eggs.output, root.join("foo_build/lib/spam/eggs.abi3.so"));
        assert_eq!(eggs.objects, vec![root.join("foo_build/temp/src/eggs.o")]);
        let compile = &eggs.compile_commands[0];
        assert!(compile.contains(&"-DNDEBUG".to_string()));
        assert!(compile.contains(&"-DLEVEL=2".to_string()));
        assert!(compile.contains(&format!("-DPy_LIMITED_API={}", LIMITED_API_VERSION)));
    }

    #[test]
    fn test_plan_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest(
            r#"{"name": "foo", "version": "0.0.0", "ext_modules": [{"name": "foo", "sources": ["foo.c"]}]}"#,
        );
        let cmd = command(manifest, BuildConfig::default());

        match cmd.plan(dir.path()) {
            Err(BuildError::MissingSource { extension, path }) => {
                assert_eq!(extension, "foo");
                assert_eq!(path, dir.path().join("foo.c"));
            }
            other => panic!("expected MissingSource, got {:?}", other),
        }
    }

    #[test]
    fn test_macos_link_flags() {
        let (dir, manifest) = project();
        let cmd = BuildCommand::new(
            manifest,
            cpython(),
            BuildConfig::default(),
            Platform::from_target("macos-arm64"),
        )
        .unwrap()
        .with_compiler("clang");

        let steps = cmd.plan(dir.path()).unwrap();
        assert_eq!(
            &steps[0].link_command[..4],
            &["clang", "-bundle", "-undefined", "dynamic_lookup"]
        );
    }

    #[test]
    fn test_run_writes_plan() {
        let (dir, manifest) = project();
        let cmd = command(manifest, BuildConfig::default());
        let root = dir.path();

        let steps = cmd.run(root).unwrap();

        assert!(root.join("foo_build/lib/spam").is_dir());
        assert!(root.join("foo_build/temp/src").is_dir());

        let plan: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(root.join("foo_build").join(PLAN_FILE)).unwrap())
                .unwrap();
        assert_eq!(plan.as_array().unwrap().len(), steps.len());
        assert_eq!(plan[1]["extension"], "spam.eggs");

        let options = BuildOptions {
            build_base: "foo_build".to_string(),
            ..BuildOptions::default()
        };
        assert!(clean_build(root, &options).unwrap());
        assert!(!root.join("foo_build").exists());
        assert!(!clean_build(root, &options).unwrap());
    }

    #[test]
    fn test_object_name() {
        assert_eq!(object_name(Path::new("src/a.c")), PathBuf::from("src/a.o"));
        assert_eq!(object_name(Path::new("./src/a.c")), PathBuf::from("src/a.o"));
        assert_eq!(object_name(Path::new("../shared/b.c")), PathBuf::from("shared/b.o"));
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_sources_keep_their_directories() {
        assert_eq!(object_name(Path::new("/a/x.c")), PathBuf::from("a/x.o"));
        assert_ne!(object_name(Path::new("/a/x.c")), object_name(Path::new("/b/x.c")));
    }

    #[test]
    fn test_same_stem_sources_get_distinct_objects() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.c"), "/* c */").unwrap();
        fs::write(dir.path().join("x.cpp"), "/* c++ */").unwrap();

        let cmd = command(
            manifest(
                r#"{"name": "foo", "version": "0.0.0", "ext_modules": [{"name": "foo", "sources": ["x.c", "x.cpp"]}]}"#,
            ),
            BuildConfig::default(),
        );

        let steps = cmd.plan(dir.path()).unwrap();
        let build_temp = dir.path().join("build/temp");
        assert_eq!(
            steps[0].objects,
            vec![build_temp.join("x.o"), build_temp.join("x.cpp.o")]
        );
    }

    #[test]
    fn test_clean_rejects_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("foo.c"), "/* foo */").unwrap();

        for build_base in ["", ".", "./", "..", "out/../.."] {
            let options = BuildOptions {
                build_base: build_base.to_string(),
                ..BuildOptions::default()
            };
            assert!(clean_build(&root, &options).is_err(), "{:?} accepted", build_base);
        }

        // Absolute paths pass the lexical check but still resolve to the root
        let options = BuildOptions {
            build_base: root.display().to_string(),
            ..BuildOptions::default()
        };
        assert!(clean_build(&root, &options).is_err());

        let options = BuildOptions {
            build_base: dir.path().display().to_string(),
            ..BuildOptions::default()
        };
        assert!(clean_build(&root, &options).is_err());

        assert!(root.join("foo.c").is_file());
    }
}
