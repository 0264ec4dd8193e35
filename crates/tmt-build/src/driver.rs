//! The build driver (§4.3): wildcard compile (every source in a directory,
//! language picked per-file), target compile (an explicit source list into
//! one named executable), and clean.
//!
//! Grounded on `original_source::internal::compilation.makefile`: both
//! operations shell out to `make -C <dir> -f <makefile>` with the chosen
//! language's environment, and a build directory is the only generated
//! artifact `clean` needs to remove.

use std::path::{Path, PathBuf};

use tmt_core::outcome::{CompilationOutcome, CompilationResult};
use tmt_core::TmtError;
use tmt_sandbox::{Limits, SpawnOptions, run_and_capture};

use crate::language::{Language, MakeKind};

/// Per-language compiler overrides threaded in from `compiler.yaml`
/// (`tmt_config::CompilerOverrides`), already resolved to this crate's own
/// shape so `tmt-build` doesn't need to depend on `serde`.
#[derive(Debug, Clone, Default)]
pub struct CompilerOverride {
    pub compiler: Option<String>,
    pub extra_flags: Vec<String>,
}

fn compile_flags_for(language: Language, over: Option<&CompilerOverride>) -> Vec<String> {
    let mut flags = language.default_compile_flags();
    if let Some(over) = over {
        flags.extend(over.extra_flags.iter().cloned());
    }
    flags
}

fn materialize_makefile(template: &str) -> std::io::Result<tempfile::NamedTempFile> {
    use std::io::Write;
    let mut file = tempfile::Builder::new().suffix(".mk").tempfile()?;
    file.write_all(template.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn make_binary() -> Result<PathBuf, TmtError> {
    which::which("make")
        .map_err(|_| TmtError::Internal("`make` was not found on PATH".to_string()))
}

fn run_make(
    directory: &Path,
    makefile: &Path,
    envs: Vec<(String, String)>,
    time_limit_sec: f64,
    memory_limit_mib: Option<u64>,
) -> Result<CompilationResult, TmtError> {
    let make = make_binary()?;

    let args = vec![
        "-C".to_string(),
        directory.to_string_lossy().into_owned(),
        "-f".to_string(),
        makefile.to_string_lossy().into_owned(),
    ];

    let limits = Limits {
        time_limit_sec,
        memory_limit_mib,
        output_limit_mib: None,
    };
    let opts = SpawnOptions {
        envs,
        ..Default::default()
    };

    tracing::debug!(directory = %directory.display(), "running make");
    let (proc, captured) = run_and_capture(&make, &args, limits, opts)
        .map_err(|e| TmtError::Internal(format!("failed to spawn make: {e}")))?;

    let log = format!("{}{}", captured.stdout, captured.stderr);
    let result = proc.result.unwrap_or_default();

    if proc.is_timedout() {
        tracing::warn!(directory = %directory.display(), "make timed out");
        return Ok(CompilationResult {
            verdict: Some(CompilationOutcome::TimedOut),
            log,
            produced_file: None,
        });
    }
    if result.exit_code != Some(0) {
        tracing::warn!(directory = %directory.display(), exit_code = ?result.exit_code, "make failed");
        return Ok(CompilationResult {
            verdict: Some(CompilationOutcome::Failed),
            log,
            produced_file: None,
        });
    }
    tracing::debug!(directory = %directory.display(), "make succeeded");
    Ok(CompilationResult {
        verdict: Some(CompilationOutcome::Success),
        log,
        produced_file: None,
    })
}

/// Compiles every source file in `directory` whose extension is claimed by
/// one of `Language::ALL`, trying each language descriptor in turn; the
/// first language encountering a matching source drives the whole batch
/// (matching `original_source`'s "abort the batch on first failure").
pub fn compile_wildcard(
    directory: &Path,
    include_path: &Path,
    executable_stack_mib: u64,
    compiler_overrides: &std::collections::HashMap<String, CompilerOverride>,
    trusted_time_limit_sec: f64,
    trusted_memory_limit_mib: Option<u64>,
) -> Result<CompilationResult, TmtError> {
    let mut combined_log = String::new();

    for language in Language::ALL {
        let has_sources = language.source_extensions().iter().any(|ext| {
            let pattern = directory.join(format!("*{ext}"));
            glob::glob(&pattern.to_string_lossy())
                .map(|mut matches| matches.next().is_some())
                .unwrap_or(false)
        });
        if !has_sources {
            continue;
        }

        let over = compiler_overrides.get(language.name());
        let flags = compile_flags_for(language, over);
        let mut envs = language.make_env(&flags, include_path, executable_stack_mib);
        let compiler_env = match (language, over.and_then(|o| o.compiler.as_deref())) {
            (Language::Cpp, Some(cxx)) => Some(("CXX", cxx)),
            _ => None,
        };
        if let Some((key, value)) = compiler_env {
            envs.push((key.to_string(), value.to_string()));
        }

        let makefile = materialize_makefile(language.makefile_template(MakeKind::Wildcard))
            .map_err(|e| TmtError::Internal(format!("failed to write makefile: {e}")))?;

        let result = run_make(
            directory,
            makefile.path(),
            envs,
            trusted_time_limit_sec,
            trusted_memory_limit_mib,
        )?;
        combined_log.push_str(&result.log);

        if !result.is_success() {
            return Ok(CompilationResult {
                log: combined_log,
                ..result
            });
        }
    }

    Ok(CompilationResult {
        verdict: Some(CompilationOutcome::Success),
        log: combined_log,
        produced_file: None,
    })
}

/// Compiles `sources` (all in one language) into `build/<target>` under
/// `directory`.
pub fn compile_target(
    directory: &Path,
    sources: &[PathBuf],
    target: &str,
    include_path: &Path,
    executable_stack_mib: u64,
    compiler_overrides: &std::collections::HashMap<String, CompilerOverride>,
    trusted_time_limit_sec: f64,
    trusted_memory_limit_mib: Option<u64>,
) -> Result<CompilationResult, TmtError> {
    let language = Language::ALL
        .into_iter()
        .find(|lang| lang.matches_sources(sources));

    let Some(language) = language else {
        return Ok(CompilationResult::failed(format!(
            "source files {sources:?} are not recognized by any language"
        )));
    };

    let over = compiler_overrides.get(language.name());
    let flags = compile_flags_for(language, over);
    let mut envs = language.make_env(&flags, include_path, executable_stack_mib);
    envs.push(("SRCS".to_string(), join_paths(sources)));
    envs.push(("TARGET_NAME".to_string(), target.to_string()));
    let compiler_env = match (language, over.and_then(|o| o.compiler.as_deref())) {
        (Language::Cpp, Some(cxx)) => Some(("CXX", cxx)),
        _ => None,
    };
    if let Some((key, value)) = compiler_env {
        envs.push((key.to_string(), value.to_string()));
    }

    let makefile = materialize_makefile(language.makefile_template(MakeKind::Target))
        .map_err(|e| TmtError::Internal(format!("failed to write makefile: {e}")))?;

    let mut result = run_make(
        directory,
        makefile.path(),
        envs,
        trusted_time_limit_sec,
        trusted_memory_limit_mib,
    )?;

    if result.is_success() {
        let produced = directory
            .join("build")
            .join(format!("{target}{}", language.executable_extension().unwrap_or("")));
        result.produced_file = Some(produced);
    }

    Ok(result)
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Removes `directory/build` if present; `make`'s own per-target cleanup
/// rules are never invoked since the driver never ships a custom Makefile
/// with project-specific clean logic (§4.3 "Clean").
pub fn clean(directory: &Path) -> std::io::Result<()> {
    let build_dir = directory.join("build");
    if build_dir.exists() {
        std::fs::remove_dir_all(build_dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn compile_target_rejects_unrecognized_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let result = compile_target(
            tmp.path(),
            &[PathBuf::from("weird.rs")],
            "out",
            &tmp.path().join("include"),
            8,
            &HashMap::new(),
            60.0,
            None,
        )
        .unwrap();
        assert!(!result.is_success());
    }

    #[test]
    fn clean_removes_build_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("build")).unwrap();
        clean(tmp.path()).unwrap();
        assert!(!tmp.path().join("build").exists());
    }

    #[test]
    fn clean_is_noop_without_build_directory() {
        let tmp = tempfile::tempdir().unwrap();
        clean(tmp.path()).unwrap();
    }
}
