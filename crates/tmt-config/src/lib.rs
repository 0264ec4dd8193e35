//! Config loading and problem-directory layout (§6c, §6d): `problem.yaml` /
//! `compiler.yaml` deserialization and validation, plus the `ProblemPaths`
//! helper every stage threads through.

pub mod paths;
pub mod schema;

pub use paths::{ProblemPaths, find_problem_dir};
pub use schema::{
    AnswerGeneration, Checker, CheckerType, CompilerOverrides, Interactor, JudgeConvention,
    LanguageOverride, ProblemConfig, ProblemType, Solution, TrustedLimits, Validator,
    parse_bytes_to_mib, parse_time_to_sec,
};
