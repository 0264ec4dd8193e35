//! Problem directory layout helper (§6d).
//!
//! Grounded on `original_source::internal::context::paths.ProblemDirectoryHelper`:
//! every subdirectory is a plain property over `problem_dir`; `find_problem_dir`
//! matches its upward-search convention (walk ancestors looking for
//! `problem.yaml`).

use std::path::{Path, PathBuf};

use tmt_core::TmtError;

#[derive(Debug, Clone)]
pub struct ProblemPaths {
    pub problem_dir: PathBuf,
}

impl ProblemPaths {
    pub fn new(problem_dir: impl Into<PathBuf>) -> Self {
        Self {
            problem_dir: problem_dir.into(),
        }
    }

    fn join(&self, parts: &[&str]) -> PathBuf {
        let mut path = self.problem_dir.clone();
        for part in parts {
            path.push(part);
        }
        path
    }

    pub fn problem_yaml(&self) -> PathBuf {
        self.join(&["problem.yaml"])
    }

    pub fn compiler_yaml(&self) -> PathBuf {
        self.join(&["compiler.yaml"])
    }

    pub fn recipe(&self) -> PathBuf {
        self.join(&["recipe"])
    }

    /// Shared headers (e.g. `testlib.h`) every compile's `-I` points at.
    pub fn include(&self) -> PathBuf {
        self.join(&["include"])
    }

    pub fn generator(&self) -> PathBuf {
        self.join(&["generator"])
    }

    pub fn generator_build(&self) -> PathBuf {
        self.join(&["generator", "build"])
    }

    pub fn generator_manuals(&self) -> PathBuf {
        self.join(&["generator", "manual"])
    }

    pub fn validator(&self) -> PathBuf {
        self.join(&["validator"])
    }

    pub fn validator_build(&self) -> PathBuf {
        self.join(&["validator", "build"])
    }

    pub fn solutions(&self) -> PathBuf {
        self.join(&["solutions"])
    }

    pub fn solutions_build(&self) -> PathBuf {
        self.join(&["solutions", "build"])
    }

    pub fn checker(&self) -> PathBuf {
        self.join(&["checker"])
    }

    pub fn checker_build(&self) -> PathBuf {
        self.join(&["checker", "build"])
    }

    pub fn interactor(&self) -> PathBuf {
        self.join(&["interactor"])
    }

    pub fn interactor_build(&self) -> PathBuf {
        self.join(&["interactor", "build"])
    }

    pub fn testcases(&self) -> PathBuf {
        self.join(&["testcases"])
    }

    pub fn testcases_summary(&self) -> PathBuf {
        self.join(&["testcases", "summary"])
    }

    pub fn testcases_hashes(&self) -> PathBuf {
        self.join(&["testcases", "hash.json"])
    }

    pub fn sandbox(&self) -> PathBuf {
        self.join(&["sandbox"])
    }

    pub fn sandbox_generation(&self) -> PathBuf {
        self.join(&["sandbox", "generation"])
    }

    pub fn sandbox_validation(&self) -> PathBuf {
        self.join(&["sandbox", "validation"])
    }

    pub fn sandbox_solution(&self) -> PathBuf {
        self.join(&["sandbox", "solution"])
    }

    pub fn sandbox_checker(&self) -> PathBuf {
        self.join(&["sandbox", "checker"])
    }

    pub fn sandbox_interactor(&self) -> PathBuf {
        self.join(&["sandbox", "interactor"])
    }

    pub fn logs(&self) -> PathBuf {
        self.join(&["logs"])
    }

    pub fn logs_generation(&self) -> PathBuf {
        self.join(&["logs", "generation"])
    }

    pub fn logs_invocation(&self) -> PathBuf {
        self.join(&["logs", "invocation"])
    }

    pub fn construct_test_filename(&self, codename: &str, ext: &str) -> String {
        format!("{codename}{ext}")
    }

    /// Resolves a `manual FILE` reference against `generator/manual/`.
    pub fn replace_with_manual(&self, filename: &str) -> Result<PathBuf, TmtError> {
        let path = self.generator_manuals().join(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(TmtError::ConfigMissing {
                filetype: "manual".into(),
                path,
            })
        }
    }

    /// Resolves a generator command name against `generator/build/`.
    pub fn replace_with_generator(&self, filename: &str) -> Result<PathBuf, TmtError> {
        let path = self.generator_build().join(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(TmtError::ConfigMissing {
                filetype: "generator".into(),
                path,
            })
        }
    }

    /// Resolves a submission filename against `solutions/`.
    pub fn replace_with_solution(&self, filename: &str) -> Result<PathBuf, TmtError> {
        let path = self.solutions().join(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(TmtError::ConfigMissing {
                filetype: "solution".into(),
                path,
            })
        }
    }

    /// Resolves a validator command name against `validator/build/`.
    pub fn replace_with_validator(&self, filename: &str) -> Result<PathBuf, TmtError> {
        let path = self.validator_build().join(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(TmtError::ConfigMissing {
                filetype: "validator".into(),
                path,
            })
        }
    }

    pub fn has_checker_directory(&self) -> bool {
        self.checker().is_dir()
    }

    pub fn has_interactor_directory(&self) -> bool {
        self.interactor().is_dir()
    }

    /// Removes every file in `testcases/` except `hash.json` (kept so a
    /// subsequent `--verify-hash` still has something to diff against).
    pub fn clean_testcases(&self) -> std::io::Result<()> {
        let dir = self.testcases();
        if !dir.exists() {
            return Ok(());
        }
        let hashes = self.testcases_hashes();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path() == hashes {
                continue;
            }
            remove_entry(&entry.path())?;
        }
        Ok(())
    }

    pub fn clean_logs(&self) -> std::io::Result<()> {
        let dir = self.logs();
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn clean_sandbox(&self) -> std::io::Result<()> {
        let dir = self.sandbox();
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    /// Empties every entry in `dir` without removing `dir` itself: used to
    /// reset a stage's sandbox directory between uses (§3 "Sandbox files").
    pub fn empty_directory(&self, dir: &Path) -> std::io::Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(dir)? {
            remove_entry(&entry?.path())?;
        }
        Ok(())
    }
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Walks `start` and its ancestors looking for `problem.yaml`, matching
/// `original_source`'s `find_problem_dir`.
pub fn find_problem_dir(start: &Path) -> Result<PathBuf, TmtError> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join("problem.yaml").is_file() {
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }
    Err(TmtError::ProblemRootNotFound(start.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn find_problem_dir_walks_ancestors() {
        let tmp = tempfile::tempdir().unwrap();
        let problem_dir = tmp.path().join("problems").join("aplusb");
        let nested = problem_dir.join("generator");
        fs::create_dir_all(&nested).unwrap();
        fs::write(problem_dir.join("problem.yaml"), "x").unwrap();

        let found = find_problem_dir(&nested).unwrap();
        assert_eq!(found, problem_dir);
    }

    #[test]
    fn find_problem_dir_errors_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(find_problem_dir(tmp.path()).is_err());
    }

    #[test]
    fn clean_testcases_keeps_hash_json() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        fs::create_dir_all(paths.testcases()).unwrap();
        fs::write(paths.testcases().join("01_t_01.in"), "1").unwrap();
        fs::write(paths.testcases_hashes(), "{}").unwrap();

        paths.clean_testcases().unwrap();

        assert!(!paths.testcases().join("01_t_01.in").exists());
        assert!(paths.testcases_hashes().exists());
    }
}
