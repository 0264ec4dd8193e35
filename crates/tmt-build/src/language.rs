//! Language descriptors (§4.3.1): a closed sum of the two languages
//! `original_source` ships, `compilation/languages/{cpp,python}.py`. Each
//! descriptor knows its source extensions, its executable extension (`None`
//! for a native binary, `Some(".pyz")` for an interpreted target), which
//! embedded Makefile drives its wildcard/target compile, and how to turn a
//! built artifact back into an argv that runs it.

use std::path::Path;

/// Which embedded Makefile template a compile should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MakeKind {
    Wildcard,
    Target,
}

const CPP_WILDCARD_MK: &str = include_str!("../makefiles/cpp.wildcard.mk");
const CPP_TARGET_MK: &str = include_str!("../makefiles/cpp.target.mk");
const PYTHON_WILDCARD_MK: &str = include_str!("../makefiles/python.wildcard.mk");
const PYTHON_TARGET_MK: &str = include_str!("../makefiles/python.target.mk");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Cpp,
    Python3,
}

impl Language {
    /// Driver iteration order: the descriptor list is tried in this order
    /// both for wildcard compiles and to pick a target's language.
    pub const ALL: [Language; 2] = [Language::Cpp, Language::Python3];

    pub fn name(self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Python3 => "python3",
        }
    }

    pub fn source_extensions(self) -> &'static [&'static str] {
        match self {
            Language::Cpp => &[".cpp", ".cc"],
            Language::Python3 => &[".py"],
        }
    }

    /// `None` means the compile output is directly executable (an ELF
    /// binary); `Some(ext)` means running it needs an interpreter plus this
    /// suffix appended to the target name.
    pub fn executable_extension(self) -> Option<&'static str> {
        match self {
            Language::Cpp => None,
            Language::Python3 => Some(".pyz"),
        }
    }

    /// True if every source's extension is one this language claims.
    pub fn matches_sources(self, sources: &[impl AsRef<Path>]) -> bool {
        if sources.is_empty() {
            return false;
        }
        sources.iter().all(|src| {
            let src = src.as_ref();
            self.source_extensions()
                .iter()
                .any(|ext| src.to_string_lossy().ends_with(ext))
        })
    }

    /// Matches any one source's extension — used when iterating wildcard
    /// directory entries one file at a time.
    pub fn owns_extension(self, path: &Path) -> bool {
        self.source_extensions()
            .iter()
            .any(|ext| path.to_string_lossy().ends_with(ext))
    }

    pub fn makefile_template(self, kind: MakeKind) -> &'static str {
        match (self, kind) {
            (Language::Cpp, MakeKind::Wildcard) => CPP_WILDCARD_MK,
            (Language::Cpp, MakeKind::Target) => CPP_TARGET_MK,
            (Language::Python3, MakeKind::Wildcard) => PYTHON_WILDCARD_MK,
            (Language::Python3, MakeKind::Target) => PYTHON_TARGET_MK,
        }
    }

    /// `-Wl,-stack_size,<hex bytes>`, capped at 512 MiB, Darwin only — the
    /// linker directive `original_source` substitutes for `RLIMIT_STACK`,
    /// which macOS's linker ignores for the main thread.
    fn stack_size_args(self, executable_stack_mib: u64) -> Vec<String> {
        if self != Language::Cpp {
            return Vec::new();
        }
        if cfg!(target_os = "macos") {
            let capped = executable_stack_mib.min(512);
            vec![
                "-Wl,-stack_size".to_string(),
                format!("-Wl,{:x}", capped * 1024 * 1024),
            ]
        } else {
            Vec::new()
        }
    }

    /// Default `CXXFLAGS`, before the caller's `compiler.yaml` overrides
    /// (if any) and the stack-size linker directive are layered on.
    pub fn default_compile_flags(self) -> Vec<String> {
        match self {
            Language::Cpp => {
                let mut flags: Vec<String> = ["-std=gnu++20", "-O2", "-pipe", "-s"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                if !cfg!(target_os = "macos") {
                    flags.push("-static".to_string());
                }
                flags
            }
            Language::Python3 => Vec::new(),
        }
    }

    /// Environment passed to `make` for a compile of this language:
    /// `CXXFLAGS`/`INCLUDE_PATHS` for C++, nothing extra for Python.
    pub fn make_env(
        self,
        compile_flags: &[String],
        include_path: &Path,
        executable_stack_mib: u64,
    ) -> Vec<(String, String)> {
        match self {
            Language::Cpp => {
                let mut flags = compile_flags.to_vec();
                flags.extend(self.stack_size_args(executable_stack_mib));
                vec![
                    ("CXXFLAGS".to_string(), flags.join(" ")),
                    (
                        "INCLUDE_PATHS".to_string(),
                        include_path.to_string_lossy().into_owned(),
                    ),
                ]
            }
            Language::Python3 => Vec::new(),
        }
    }

    /// The argv needed to run a built artifact: just the binary for C++,
    /// `[$PYTHON-or-python3, target.pyz]` for Python.
    pub fn execution_command(self, executable_base: &str) -> Vec<String> {
        match self {
            Language::Cpp => vec![executable_base.to_string()],
            Language::Python3 => {
                let interpreter = std::env::var("PYTHON").unwrap_or_else(|_| "python3".to_string());
                vec![
                    interpreter,
                    format!("{executable_base}{}", self.executable_extension().unwrap()),
                ]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_sources_requires_uniform_extension() {
        assert!(Language::Cpp.matches_sources(&["a.cpp", "b.cc"]));
        assert!(!Language::Cpp.matches_sources(&["a.cpp", "b.py"]));
        assert!(Language::Python3.matches_sources(&["a.py"]));
    }

    #[test]
    fn cpp_flags_include_static_off_darwin() {
        let flags = Language::Cpp.default_compile_flags();
        assert!(flags.contains(&"-std=gnu++20".to_string()));
        if !cfg!(target_os = "macos") {
            assert!(flags.contains(&"-static".to_string()));
        }
    }

    #[test]
    fn python_execution_command_honors_python_env_override() {
        unsafe {
            std::env::set_var("PYTHON", "python3.11");
        }
        let cmd = Language::Python3.execution_command("checker");
        assert_eq!(cmd, vec!["python3.11".to_string(), "checker.pyz".to_string()]);
        unsafe {
            std::env::remove_var("PYTHON");
        }
    }

    #[test]
    fn cpp_execution_command_is_bare_binary() {
        assert_eq!(Language::Cpp.execution_command("sol"), vec!["sol".to_string()]);
    }
}
