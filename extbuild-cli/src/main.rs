use anyhow::Result;
use clap::{Parser, Subcommand};
use extbuild_core::{
    clean_build, platform_display_name, BuildCommand, BuildConfig, HostToolchain, Manifest, Platform,
    MANIFEST_FILE,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "extbuild")]
#[command(version)]
#[command(about = "Build planner for compiled interpreter extensions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan the extension build and lay out the build directory
    Build {
        /// Path to extbuild.json
        #[arg(short, long, value_name = "PATH", default_value = MANIFEST_FILE)]
        manifest: PathBuf,

        /// Interpreter to probe for extension suffixes
        #[arg(long, value_name = "EXE", default_value = "python3")]
        python: PathBuf,

        /// Target platform (e.g., linux-x64, macos-arm64)
        #[arg(long, value_name = "TARGET")]
        target: Option<String>,

        /// C compiler to plan with (default: clang, then gcc)
        #[arg(long, value_name = "CC")]
        compiler: Option<String>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the artifact filename of one or more extensions
    Filename {
        /// Dotted extension names
        #[arg(value_name = "NAME", required = true)]
        names: Vec<String>,

        /// Path to extbuild.json
        #[arg(short, long, value_name = "PATH", default_value = MANIFEST_FILE)]
        manifest: PathBuf,

        /// Interpreter to probe for extension suffixes
        #[arg(long, value_name = "EXE", default_value = "python3")]
        python: PathBuf,

        /// Target platform (e.g., linux-x64, macos-arm64)
        #[arg(long, value_name = "TARGET")]
        target: Option<String>,
    },

    /// Show the interpreter's extension suffixes
    Probe {
        /// Interpreter to probe
        #[arg(long, value_name = "EXE", default_value = "python3")]
        python: PathBuf,
    },

    /// Initialize extbuild.json in existing directory
    Init {
        /// Project path (default: current directory)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },

    /// Remove the build directory
    Clean {
        /// Path to extbuild.json
        #[arg(short, long, value_name = "PATH", default_value = MANIFEST_FILE)]
        manifest: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            manifest,
            python,
            target,
            compiler,
            json,
        } => {
            let root = project_root(&manifest);
            let mut command = load_command(&manifest, &python, target.as_deref())?;
            if let Some(compiler) = compiler {
                command = command.with_compiler(compiler);
            }

            let steps = command.run(&root)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&steps)?);
            } else {
                for step in &steps {
                    println!("   🔨 {} -> {}", step.extension, step.output.display());
                }
                println!("✅ Planned {} extension(s)", steps.len());
            }
            Ok(())
        }

        Commands::Filename {
            names,
            manifest,
            python,
            target,
        } => {
            let command = load_command(&manifest, &python, target.as_deref())?;
            for name in &names {
                println!("{}", command.ext_filename(name)?);
            }
            Ok(())
        }

        Commands::Probe { python } => {
            let toolchain = HostToolchain::probe(&python)?;
            println!("{}", serde_json::to_string_pretty(&toolchain)?);
            Ok(())
        }

        Commands::Init { path } => {
            init_project(path)?;
            Ok(())
        }

        Commands::Clean { manifest } => {
            let root = project_root(&manifest);
            let loaded = Manifest::from_file(&manifest)?;
            if clean_build(&root, &loaded.build)? {
                println!("✅ Removed {}", loaded.build.build_base);
            }
            Ok(())
        }
    }
}

/// Directory containing the manifest
fn project_root(manifest: &Path) -> PathBuf {
    match manifest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Read the manifest, configuration and toolchain into a finalized build command
fn load_command(manifest_path: &Path, python: &Path, target: Option<&str>) -> Result<BuildCommand> {
    let manifest = Manifest::from_file(manifest_path)?;
    let platform = target.map(Platform::from_target).unwrap_or_else(Platform::detect);
    log::info!(
        "Target platform: {} ({})",
        platform_display_name(&platform),
        platform.to_target_string()
    );

    // The only read of the override variable for this invocation
    let config = BuildConfig::from_env();
    let toolchain = select_toolchain(&manifest, python, &platform);

    BuildCommand::new(manifest, toolchain, config, platform)
}

/// Pinned toolchain, else a probed interpreter, else the platform default
fn select_toolchain(manifest: &Manifest, python: &Path, platform: &Platform) -> HostToolchain {
    if let Some(pinned) = &manifest.toolchain {
        log::debug!("Using pinned toolchain from manifest");
        return pinned.clone();
    }

    match HostToolchain::probe(python) {
        Ok(toolchain) => toolchain,
        Err(e) => {
            log::warn!("{:#}; assuming default extension suffixes", e);
            HostToolchain::detect(platform)
        }
    }
}

/// Initialize extbuild.json in existing directory
fn init_project(path: Option<PathBuf>) -> Result<PathBuf> {
    let project_path = path.unwrap_or_else(|| PathBuf::from("."));

    let manifest_path = project_path.join(MANIFEST_FILE);
    if manifest_path.exists() {
        anyhow::bail!("{} already exists in {}", MANIFEST_FILE, project_path.display());
    }

    // Get project name from directory
    let project_name = project_path
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .unwrap_or_else(|| "my-package".to_string());

    let manifest = Manifest {
        name: project_name,
        ..Manifest::default()
    };
    manifest.to_file(&manifest_path)?;

    println!("✅ Initialized {} in {}", MANIFEST_FILE, project_path.display());

    Ok(project_path)
}
