use std::path::PathBuf;

/// The error taxonomy for configuration, compilation, and stage-level
/// failures. Distinct from the per-testcase verdicts in [`crate::outcome`]:
/// those are data, these are reasons the run itself cannot proceed.
#[derive(thiserror::Error, Debug)]
pub enum TmtError {
    #[error("cannot find (or cannot read) {filetype} file \"{path}\"")]
    ConfigMissing { filetype: String, path: PathBuf },

    #[error("cannot find (or cannot read) {filetype} file \"{path}\" among {among}")]
    ConfigMissingAmong {
        filetype: String,
        path: String,
        among: String,
    },

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("error on recipe line {line}: {message}")]
    RecipeSyntax { line: usize, message: String },

    #[error("no problem directory found (no problem.yaml in any ancestor of {0})")]
    ProblemRootNotFound(PathBuf),

    #[error("compilation failed for {target}:\n{log}")]
    CompilationFailed { target: String, log: String },

    #[error("compilation timed out for {target} after {wall_time_sec:.3}s")]
    CompilationTimedOut { target: String, wall_time_sec: f64 },

    #[error("stage execution failure in {stage}: {message}")]
    StageExecutionFailure { stage: String, message: String },

    #[error("run interrupted")]
    Interrupted,

    #[error("internal error (program defect): {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TmtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_missing_formats_path() {
        let err = TmtError::ConfigMissing {
            filetype: "recipe".into(),
            path: PathBuf::from("problem/tmt.recipe"),
        };
        assert_eq!(
            err.to_string(),
            "cannot find (or cannot read) recipe file \"problem/tmt.recipe\""
        );
    }

    #[test]
    fn config_missing_among_formats_candidates() {
        let err = TmtError::ConfigMissingAmong {
            filetype: "generator".into(),
            path: "gen".into(),
            among: "gen.cpp, gen.py".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot find (or cannot read) generator file \"gen\" among gen.cpp, gen.py"
        );
    }

    #[test]
    fn recipe_syntax_includes_line_number() {
        let err = TmtError::RecipeSyntax {
            line: 12,
            message: "Undefined constant: ${N}".into(),
        };
        assert_eq!(
            err.to_string(),
            "error on recipe line 12: Undefined constant: ${N}"
        );
    }

    #[test]
    fn problem_root_not_found_includes_cwd() {
        let err = TmtError::ProblemRootNotFound(PathBuf::from("/tmp/foo"));
        assert_eq!(
            err.to_string(),
            "no problem directory found (no problem.yaml in any ancestor of /tmp/foo)"
        );
    }

    #[test]
    fn compilation_timed_out_formats_seconds() {
        let err = TmtError::CompilationTimedOut {
            target: "checker".into(),
            wall_time_sec: 61.234,
        };
        assert_eq!(
            err.to_string(),
            "compilation timed out for checker after 61.234s"
        );
    }

    #[test]
    fn assert_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TmtError>();
    }
}
