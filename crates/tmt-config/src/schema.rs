//! `problem.yaml` schema (§3 "Problem configuration", §6c).
//!
//! Grounded on `original_source::internal::context::config`: the same enum
//! set, the same `(\d+|\d+\.\d+)\s*(ms|s)` / `(\d+)\s*(G|GB|GiB|M|MB|MiB)`
//! limit grammars, and the same closed-enum guards (`Validator.type` must
//! be `default`, `solution.type` must be `default`,
//! `answer_generation.type` must be `solution`) raised as `ConfigInvalid`
//! rather than silently accepted.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use tmt_core::TmtError;

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+|\d+\.\d+)\s*(ms|s)$").unwrap());
static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*(G|GB|GiB|M|MB|MiB)$").unwrap());

pub fn parse_time_to_sec(field_name: &str, input: &str) -> Result<f64, TmtError> {
    let caps = TIME_RE
        .captures(input.trim())
        .ok_or_else(|| TmtError::ConfigInvalid(format!("{field_name} \"{input}\" is invalid")))?;
    let value: f64 = caps[1].parse().expect("regex guarantees numeric");
    Ok(if &caps[2] == "ms" { value / 1000.0 } else { value })
}

/// Returns `None` for the literal `"unlimited"`.
pub fn parse_bytes_to_mib(field_name: &str, input: &str) -> Result<Option<u64>, TmtError> {
    if input.trim() == "unlimited" {
        return Ok(None);
    }
    let caps = SIZE_RE
        .captures(input.trim())
        .ok_or_else(|| TmtError::ConfigInvalid(format!("{field_name} \"{input}\" is invalid")))?;
    let value: u64 = caps[1].parse().expect("regex guarantees numeric");
    Ok(Some(if caps[2].starts_with('G') { value * 1024 } else { value }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JudgeConvention {
    Icpc,
    Cms,
    OldTioj,
    NewTioj,
}

impl JudgeConvention {
    /// The exit code a validator/checker must return to mean "accepted"
    /// under this convention (§4.5, §4.7). Only ICPC's 42 is implemented;
    /// the others are accepted at config-load time (closed enum, per the
    /// distilled spec's `judge_convention` field) but not yet wired into a
    /// stage — matching the original's own unfinished CMS/TIOJ exit-code
    /// branches.
    pub fn accept_exit_code(self) -> i32 {
        match self {
            JudgeConvention::Icpc => 42,
            JudgeConvention::Cms | JudgeConvention::OldTioj | JudgeConvention::NewTioj => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Batch,
    Interactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ValidatorType {
    Default,
    Prover,
}

#[derive(Debug, Clone, Deserialize)]
struct RawValidator {
    #[serde(rename = "type")]
    kind: ValidatorType,
}

#[derive(Debug, Clone)]
pub struct Validator;

impl Validator {
    fn from_raw(raw: RawValidator) -> Result<Self, TmtError> {
        if raw.kind != ValidatorType::Default {
            return Err(TmtError::ConfigInvalid(
                "validator type is not supported yet (only \"default\")".into(),
            ));
        }
        Ok(Validator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SolutionType {
    Default,
    Grader,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSolution {
    #[serde(rename = "type")]
    kind: SolutionType,
    time_limit: String,
    memory_limit: String,
    output_limit: String,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub time_limit_sec: f64,
    pub memory_limit_mib: Option<u64>,
    pub output_limit_mib: Option<u64>,
}

impl Solution {
    fn from_raw(raw: RawSolution) -> Result<Self, TmtError> {
        if raw.kind != SolutionType::Default {
            return Err(TmtError::ConfigInvalid(
                "solution.type is not supported yet (only \"default\")".into(),
            ));
        }
        Ok(Solution {
            time_limit_sec: parse_time_to_sec("solution.time_limit", &raw.time_limit)?,
            memory_limit_mib: parse_bytes_to_mib("solution.memory_limit", &raw.memory_limit)?,
            output_limit_mib: parse_bytes_to_mib("solution.output_limit", &raw.output_limit)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum AnswerGenerationType {
    Solution,
    Generator,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAnswerGeneration {
    #[serde(rename = "type")]
    kind: AnswerGenerationType,
    filename: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnswerGeneration {
    pub filename: String,
}

impl AnswerGeneration {
    fn from_raw(raw: RawAnswerGeneration) -> Result<Self, TmtError> {
        if raw.kind != AnswerGenerationType::Solution {
            return Err(TmtError::ConfigInvalid(
                "answer_generation.type is not supported yet (only \"solution\")".into(),
            ));
        }
        let filename = raw.filename.ok_or_else(|| {
            TmtError::ConfigInvalid(
                "answer_generation.filename must be specified when type is \"solution\"".into(),
            )
        })?;
        Ok(AnswerGeneration { filename })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckerType {
    Default,
    Custom,
}

#[derive(Debug, Clone, Deserialize)]
struct RawChecker {
    #[serde(rename = "type")]
    kind: CheckerType,
    filename: Option<String>,
    #[serde(default)]
    arguments: Vec<String>,
    #[serde(default = "default_true")]
    check_forced_output: bool,
    #[serde(default = "default_true")]
    check_generated_output: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct Checker {
    pub kind: CheckerType,
    pub filename: Option<String>,
    pub arguments: Vec<String>,
    pub check_forced_output: bool,
    pub check_generated_output: bool,
}

impl Checker {
    fn from_raw(raw: RawChecker) -> Result<Self, TmtError> {
        if raw.kind == CheckerType::Custom && raw.filename.is_none() {
            return Err(TmtError::ConfigInvalid(
                "checker.filename must be specified when type is \"custom\"".into(),
            ));
        }
        Ok(Checker {
            kind: raw.kind,
            filename: raw.filename,
            arguments: raw.arguments,
            check_forced_output: raw.check_forced_output,
            check_generated_output: raw.check_generated_output,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interactor {
    pub filename: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Hardcoded "first-party tooling" limits (§3), not configurable.
#[derive(Debug, Clone, Copy)]
pub struct TrustedLimits {
    pub compile_time_limit_sec: f64,
    pub compile_memory_limit_mib: Option<u64>,
    pub step_time_limit_sec: f64,
    pub step_memory_limit_mib: Option<u64>,
    pub step_output_limit_mib: Option<u64>,
}

impl Default for TrustedLimits {
    fn default() -> Self {
        Self {
            compile_time_limit_sec: 60.0,
            compile_memory_limit_mib: None,
            step_time_limit_sec: 10.0,
            step_memory_limit_mib: Some(4 * 1024),
            step_output_limit_mib: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProblemConfig {
    title: Option<String>,
    short_name: String,
    description: Option<String>,
    input_extension: String,
    output_extension: String,
    judge_convention: JudgeConvention,
    problem_type: ProblemType,
    validator: RawValidator,
    solution: RawSolution,
    answer_generation: RawAnswerGeneration,
    checker: Option<RawChecker>,
    interactor: Option<Interactor>,
}

/// Fully validated `problem.yaml`.
#[derive(Debug, Clone)]
pub struct ProblemConfig {
    pub title: Option<String>,
    pub short_name: String,
    pub description: Option<String>,
    pub input_extension: String,
    pub output_extension: String,
    pub judge_convention: JudgeConvention,
    pub problem_type: ProblemType,
    pub validator: Validator,
    pub solution: Solution,
    pub answer_generation: AnswerGeneration,
    pub checker: Option<Checker>,
    pub interactor: Option<Interactor>,
    pub trusted: TrustedLimits,
}

impl ProblemConfig {
    pub fn parse(yaml: &str) -> Result<Self, TmtError> {
        let raw: RawProblemConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TmtError::ConfigInvalid(format!("problem.yaml: {e}")))?;

        let problem_type = raw.problem_type;
        let checker = raw.checker.map(Checker::from_raw).transpose()?;
        if problem_type != ProblemType::Batch && checker.is_some() {
            return Err(TmtError::ConfigInvalid(
                "checker should not be specified when the problem type is not batch".into(),
            ));
        }
        if problem_type == ProblemType::Interactive && raw.interactor.is_none() {
            return Err(TmtError::ConfigInvalid(
                "interactor must be specified when the problem type is interactive".into(),
            ));
        }

        Ok(ProblemConfig {
            title: raw.title,
            short_name: raw.short_name,
            description: raw.description,
            input_extension: normalize_ext(&raw.input_extension),
            output_extension: normalize_ext(&raw.output_extension),
            judge_convention: raw.judge_convention,
            problem_type,
            validator: Validator::from_raw(raw.validator)?,
            solution: Solution::from_raw(raw.solution)?,
            answer_generation: AnswerGeneration::from_raw(raw.answer_generation)?,
            checker,
            interactor: raw.interactor,
            trusted: TrustedLimits::default(),
        })
    }
}

fn normalize_ext(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

/// `compiler.yaml`: a minimal overlay map from language name to a compiler
/// binary override and extra flags (§3). Optional; absence means "use
/// built-in per-language defaults".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilerOverrides {
    #[serde(flatten)]
    pub languages: std::collections::HashMap<String, LanguageOverride>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LanguageOverride {
    pub compiler: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl CompilerOverrides {
    pub fn parse(yaml: &str) -> Result<Self, TmtError> {
        serde_yaml::from_str(yaml).map_err(|e| TmtError::ConfigInvalid(format!("compiler.yaml: {e}")))
    }
}
