// Platform detection and shared-library naming

use std::path::Path;

/// Platform information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    /// Detect current platform
    pub fn detect() -> Self {
        let os = detect_os();
        let arch = detect_arch();

        Self { os, arch }
    }

    /// Parse platform from target string (e.g., "linux-x64", "windows")
    pub fn from_target(target: &str) -> Self {
        let parts: Vec<&str> = target.split('-').collect();

        match parts.as_slice() {
            [part] if is_os(part) => Self {
                os: part.to_string(),
                arch: detect_arch(),
            },
            [part] => Self {
                os: detect_os(),
                arch: part.to_string(),
            },
            [os, arch] => Self {
                os: os.to_string(),
                arch: arch.to_string(),
            },
            // Invalid format, use current platform
            _ => Self::detect(),
        }
    }

    /// Get target string
    pub fn to_target_string(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    pub fn is_macos(&self) -> bool {
        self.os == "macos"
    }

    /// Filename prefix for shared libraries ("lib" everywhere but Windows)
    pub fn shared_library_prefix(&self) -> &'static str {
        if self.is_windows() {
            ""
        } else {
            "lib"
        }
    }

    /// Filename extension for shared libraries, including the dot
    pub fn shared_library_extension(&self) -> &'static str {
        match self.os.as_str() {
            "windows" => ".dll",
            "macos" => ".dylib",
            _ => ".so",
        }
    }

    /// Rewrite "dir/name.tag.ext" into the platform shared-library name ("dir/libname.tag.so")
    pub fn shared_library_filename(&self, filename: &str) -> String {
        let (dir, file) = match filename.rfind('/') {
            Some(pos) => filename.split_at(pos + 1),
            None => ("", filename),
        };
        // Only the final extension goes; interpreter tags stay in the stem
        let stem = Path::new(file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string());

        format!(
            "{}{}{}{}",
            dir,
            self.shared_library_prefix(),
            stem,
            self.shared_library_extension()
        )
    }

    /// Whether extensions that link to in-project libraries get "dl-" stub loaders
    pub fn uses_stubs(&self) -> bool {
        self.is_macos()
    }
}

/// Detect operating system
fn detect_os() -> String {
    if cfg!(target_os = "linux") {
        "linux".to_string()
    } else if cfg!(target_os = "macos") {
        "macos".to_string()
    } else if cfg!(target_os = "windows") {
        "windows".to_string()
    } else if cfg!(target_os = "freebsd") {
        "freebsd".to_string()
    } else if cfg!(target_os = "openbsd") {
        "openbsd".to_string()
    } else {
        "unknown".to_string()
    }
}

/// Detect CPU architecture
fn detect_arch() -> String {
    if cfg!(target_arch = "x86_64") {
        "x64".to_string()
    } else if cfg!(target_arch = "aarch64") {
        "arm64".to_string()
    } else if cfg!(target_arch = "x86") {
        "x86".to_string()
    } else if cfg!(target_arch = "riscv64") {
        "riscv64".to_string()
    } else {
        "unknown".to_string()
    }
}

/// Check if string is a known OS
fn is_os(s: &str) -> bool {
    matches!(s, "linux" | "macos" | "windows" | "freebsd" | "openbsd")
}

/// Get platform display name
pub fn platform_display_name(platform: &Platform) -> String {
    let os_name = match platform.os.as_str() {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        "openbsd" => "OpenBSD",
        _ => &platform.os,
    };

    let arch_name = match platform.arch.as_str() {
        "x64" => "x86-64",
        "arm64" => "ARM64",
        "x86" => "x86",
        "riscv64" => "RISC-V 64",
        _ => &platform.arch,
    };

    format!("{} {}", os_name, arch_name)
}
