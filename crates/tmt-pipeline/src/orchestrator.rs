//! The pipeline orchestrator (§4.8): drives every test through generation,
//! validation, answer production, and output validation in recipe order,
//! then writes the testcase summary and `hash.json`.
//!
//! Grounded on `original_source::commands::gen`: the same four-stage
//! cascade, the same "checker validates the baked answer against itself"
//! self-check, and the same summary/hash bookkeeping performed once after
//! every test has run rather than incrementally.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tmt_config::{ProblemPaths, ProblemType};
use tmt_core::outcome::{eval_outcome_to_grade_outcome, eval_outcome_to_run_outcome, ExecutionOutcome, GenerationResult};
use tmt_core::TmtError;
use tmt_recipe::{Recipe, Testcase, Testset};
use crate::checker;
use crate::context::PipelineContext;
use crate::generation;
use crate::solution;
use crate::validation;

const MODEL_SOLUTION_TARGET: &str = "model_solution";
const INTERACTOR_TARGET: &str = "interactor";
const COMPILE_STACK_MIB: u64 = 64;

/// One test's final `GenerationResult`, labeled with its canonical name.
pub struct TestOutcome {
    pub codename: String,
    pub result: GenerationResult,
}

/// Three-way diff between a stored `hash.json` and the map computed by
/// the current run (§4.8 step 3, `--verify-hash`).
#[derive(Debug, Default)]
pub struct HashDiff {
    pub mismatched: Vec<String>,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

impl HashDiff {
    pub fn is_clean(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty() && self.extra.is_empty()
    }
}

pub struct GenReport {
    pub outcomes: Vec<TestOutcome>,
    pub hash_diff: Option<HashDiff>,
}

/// Every `(testset, testcase)` pair in recipe order: testsets sorted by
/// index, each testset's own tests in declaration order (the order
/// `Recipe::all_test_names` walks, and the order canonical names were
/// assigned in).
fn ordered_tests(recipe: &Recipe) -> Vec<(&Testset, &Testcase)> {
    let mut testsets: Vec<&Testset> = recipe.testsets.iter().collect();
    testsets.sort_by_key(|t| t.index);
    testsets
        .into_iter()
        .flat_map(|t| t.tests.iter().map(move |tc| (t, tc)))
        .collect()
}

/// Compiles `interactor.filename` into `interactor/build/`. Distinct from
/// the checker build: an interactive problem's interactor lives in its own
/// `interactor/` directory (§6d) even though both stages share the same
/// `(input, answer, feedback-dir)` invocation convention.
///
/// Grounded on `original_source::internal::steps::interactor.InteractorStep.
/// compile_interactor`: compiles from `path.interactor` with `SRCS` set to
/// `config.interactor.filename`.
pub(crate) fn ensure_interactor_binary(ctx: &PipelineContext) -> Result<PathBuf, TmtError> {
    let interactor = ctx
        .config
        .interactor
        .as_ref()
        .ok_or_else(|| TmtError::Internal("interactive problem without interactor config".into()))?;
    let source = ctx.paths.interactor().join(&interactor.filename);
    if !source.is_file() {
        return Err(TmtError::ConfigMissing {
            filetype: "interactor".into(),
            path: source,
        });
    }

    let built = ctx.paths.interactor_build().join(INTERACTOR_TARGET);
    if built.is_file() {
        return Ok(built);
    }

    let result = tmt_build::compile_target(
        &ctx.paths.interactor(),
        &[source],
        INTERACTOR_TARGET,
        &ctx.paths.include(),
        COMPILE_STACK_MIB,
        &ctx.compiler_overrides,
        ctx.config.trusted.compile_time_limit_sec,
        ctx.config.trusted.compile_memory_limit_mib,
    )?;
    if !result.is_success() {
        return Err(TmtError::CompilationFailed {
            target: "interactor".into(),
            log: result.log,
        });
    }
    result
        .produced_file
        .ok_or_else(|| TmtError::Internal("interactor compiled without a produced_file".into()))
}

/// Compiles `answer_generation.filename` into `solutions/build/` the same
/// way a checker or validator source is compiled into its own `build/`
/// directory, caching on a prior successful build.
pub(crate) fn ensure_model_solution_binary(ctx: &PipelineContext) -> Result<PathBuf, TmtError> {
    let filename = &ctx.config.answer_generation.filename;
    let source = ctx.paths.solutions().join(filename);
    if !source.is_file() {
        return Err(TmtError::ConfigMissing {
            filetype: "solution".into(),
            path: source,
        });
    }

    let built = ctx.paths.solutions_build().join(MODEL_SOLUTION_TARGET);
    if built.is_file() {
        return Ok(built);
    }

    let result = tmt_build::compile_target(
        &ctx.paths.solutions(),
        &[source],
        MODEL_SOLUTION_TARGET,
        &ctx.paths.include(),
        COMPILE_STACK_MIB,
        &ctx.compiler_overrides,
        ctx.config.trusted.compile_time_limit_sec,
        ctx.config.trusted.compile_memory_limit_mib,
    )?;
    if !result.is_success() {
        return Err(TmtError::CompilationFailed {
            target: "model solution".into(),
            log: result.log,
        });
    }
    result
        .produced_file
        .ok_or_else(|| TmtError::Internal("model solution compiled without a produced_file".into()))
}

/// Runs the full `gen` pipeline: every test in recipe order, then the
/// summary file and `hash.json` (and, when `verify_hash`, a diff against
/// the previously stored map).
pub fn run_gen(ctx: &PipelineContext, verify_hash: bool) -> Result<GenReport, TmtError> {
    let accept_exit_code = ctx.config.judge_convention.accept_exit_code();
    let trusted_limits = ctx.trusted_step_limits();
    let solution_limits = ctx.solution_limits();

    // A checker only ever applies to batch problems (§4.7); an interactive
    // problem's verdict comes entirely from its interactor, compiled from
    // its own `interactor/` directory instead.
    let checker_program = match ctx.config.problem_type {
        ProblemType::Batch => Some(checker::ensure_checker_binary(
            &ctx.paths,
            ctx.config.checker.as_ref(),
            &ctx.paths.include(),
            ctx.config.trusted.compile_time_limit_sec,
            ctx.config.trusted.compile_memory_limit_mib,
        )?),
        ProblemType::Interactive => None,
    };
    let interactor_program = match ctx.config.problem_type {
        ProblemType::Interactive => Some(ensure_interactor_binary(ctx)?),
        ProblemType::Batch => None,
    };
    let model_solution = ensure_model_solution_binary(ctx)?;

    let mut outcomes = Vec::new();

    for (testset, testcase) in ordered_tests(&ctx.recipe) {
        let codename = testcase
            .test_name
            .clone()
            .ok_or_else(|| TmtError::Internal("testcase missing canonical name".into()))?;
        tracing::debug!(test = %codename, "generating testcase");
        let input_filename = ctx.construct_input_filename(&codename);
        let output_filename = ctx.construct_output_filename(&codename);
        let extra_filenames: Vec<String> = testset
            .extra_files
            .iter()
            .map(|ext| format!("{codename}{ext}"))
            .collect();

        let mut result = generation::run_generator(
            &ctx.paths,
            &testcase.execute,
            &codename,
            &input_filename,
            &output_filename,
            &extra_filenames,
            trusted_limits,
        )?;

        if result.input_generation.is_some_and(ExecutionOutcome::is_ok) {
            let validation_outcome = validation::run_validation(
                &ctx.paths,
                &testcase.validation,
                accept_exit_code,
                &codename,
                &input_filename,
                &extra_filenames,
                trusted_limits,
            )?;
            result.input_validation = Some(validation_outcome.verdict);

            if !validation_outcome.verdict.is_ok() {
                result.reason = validation_outcome.reason;
                result.output_generation = Some(ExecutionOutcome::Skipped);
                result.output_validation = Some(ExecutionOutcome::Skipped);
            } else {
                if !result.is_output_forced {
                    let eval = match ctx.config.problem_type {
                        ProblemType::Batch => solution::run_batch_solution(
                            &ctx.paths,
                            &model_solution,
                            &[],
                            &ctx.paths.logs_generation(),
                            &codename,
                            &input_filename,
                            &output_filename,
                            solution_limits,
                            true,
                        )?,
                        ProblemType::Interactive => {
                            let interactor_args = ctx
                                .config
                                .interactor
                                .as_ref()
                                .map(|i| i.arguments.clone())
                                .unwrap_or_default();
                            solution::run_interactive_solution(
                                &ctx.paths,
                                &model_solution,
                                &[],
                                interactor_program
                                    .as_deref()
                                    .expect("interactive problem always compiles an interactor"),
                                &interactor_args,
                                &codename,
                                &input_filename,
                                None,
                                solution_limits,
                                trusted_limits,
                            )?
                        }
                    };
                    let outcome = eval_outcome_to_run_outcome(eval.verdict);
                    result.output_generation = Some(outcome);
                    if !outcome.is_ok() {
                        result.reason = if eval.checker_reason.is_empty() {
                            format!("model solution verdict {}", eval.verdict)
                        } else {
                            eval.checker_reason
                        };
                    }
                }

                if result.output_generation.is_some_and(ExecutionOutcome::is_ok) {
                    let applicable = checker::checker_is_applicable(
                        ctx.config.problem_type,
                        ctx.config.checker.as_ref(),
                        result.is_output_forced,
                    );
                    if applicable {
                        let answer_path = ctx.paths.testcases().join(&output_filename);
                        let checker_args = ctx
                            .config
                            .checker
                            .as_ref()
                            .map(|c| c.arguments.clone())
                            .unwrap_or_default();
                        let eval = checker::run_checker(
                            &ctx.paths,
                            checker_program
                                .as_deref()
                                .expect("checker_is_applicable implies a batch problem with a checker compiled"),
                            &checker_args,
                            &codename,
                            &input_filename,
                            &output_filename,
                            &answer_path,
                            trusted_limits,
                        )?;
                        let outcome = eval_outcome_to_grade_outcome(eval.verdict);
                        result.output_validation = Some(outcome);
                        if !outcome.is_ok() {
                            result.reason = if eval.checker_reason.is_empty() {
                                format!("checker verdict {}", eval.verdict)
                            } else {
                                eval.checker_reason
                            };
                        }
                    } else {
                        result.output_validation = Some(ExecutionOutcome::SkippedSuccess);
                    }
                } else {
                    result.output_validation = Some(ExecutionOutcome::Skipped);
                }
            }
        } else {
            result.input_validation = Some(ExecutionOutcome::Skipped);
            result.output_generation = Some(ExecutionOutcome::Skipped);
            result.output_validation = Some(ExecutionOutcome::Skipped);
        }

        write_reason_log(&ctx.paths, &codename, &result)?;
        tracing::debug!(test = %codename, well_formed = result.is_well_formed(), "testcase generated");
        outcomes.push(TestOutcome { codename, result });
    }

    write_summary(&ctx.paths, &outcomes)?;

    let computed = compute_hashes(&ctx.paths)?;
    let hash_diff = if verify_hash {
        let existing = read_existing_hashes(&ctx.paths)?;
        Some(diff_hashes(&existing, &computed))
    } else {
        None
    };
    write_hash_json(&ctx.paths.testcases_hashes(), &computed)?;

    Ok(GenReport { outcomes, hash_diff })
}

fn write_reason_log(paths: &ProblemPaths, codename: &str, result: &GenerationResult) -> std::io::Result<()> {
    std::fs::create_dir_all(paths.logs_generation())?;
    let path = paths.logs_generation().join(format!("{codename}.gen.log"));
    std::fs::write(path, &result.reason)
}

fn write_summary(paths: &ProblemPaths, outcomes: &[TestOutcome]) -> std::io::Result<()> {
    let mut body = String::new();
    for outcome in outcomes {
        if outcome.result.is_success() {
            body.push_str(&outcome.codename);
            body.push('\n');
        }
    }
    std::fs::create_dir_all(paths.testcases())?;
    std::fs::write(paths.testcases_summary(), body)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Hashes every file under `testcases/` except the bookkeeping files
/// themselves (`hash.json`, `summary`).
fn compute_hashes(paths: &ProblemPaths) -> std::io::Result<BTreeMap<String, String>> {
    use sha2::{Digest, Sha256};

    let mut map = BTreeMap::new();
    let dir = paths.testcases();
    if !dir.is_dir() {
        return Ok(map);
    }
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "hash.json" || name == "summary" {
            continue;
        }
        let bytes = std::fs::read(&path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        map.insert(name, to_hex(&hasher.finalize()));
    }
    Ok(map)
}

fn read_existing_hashes(paths: &ProblemPaths) -> std::io::Result<BTreeMap<String, String>> {
    let path = paths.testcases_hashes();
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text).unwrap_or_default())
}

/// Writes `hash.json` sorted (a `BTreeMap` is already key-ordered) with a
/// 4-space indent, matching the byte-identical round-trip invariant.
fn write_hash_json(path: &std::path::Path, map: &BTreeMap<String, String>) -> std::io::Result<()> {
    use serde::Serialize;

    let file = std::fs::File::create(path)?;
    let mut serializer =
        serde_json::Serializer::with_formatter(file, serde_json::ser::PrettyFormatter::with_indent(b"    "));
    map.serialize(&mut serializer)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}

fn diff_hashes(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> HashDiff {
    let mut diff = HashDiff::default();
    for (name, old_hash) in old {
        match new.get(name) {
            Some(new_hash) if new_hash == old_hash => {}
            Some(_) => diff.mismatched.push(name.clone()),
            None => diff.missing.push(name.clone()),
        }
    }
    for name in new.keys() {
        if !old.contains_key(name) {
            diff.extra.push(name.clone());
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tmt_config::ProblemConfig;

    const BATCH_YAML: &str = r#"
short_name: aplusb
input_extension: in
output_extension: out
judge_convention: icpc
problem_type: batch
validator:
  type: default
solution:
  type: default
  time_limit: "2s"
  memory_limit: "256MB"
  output_limit: "64MB"
answer_generation:
  type: solution
  filename: model.sh
"#;

    fn write_exec(path: &std::path::Path, script: &str) {
        std::fs::write(path, script).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn setup(tmp: &std::path::Path) -> PipelineContext {
        let paths = ProblemPaths::new(tmp);
        std::fs::create_dir_all(paths.generator_build()).unwrap();
        write_exec(&paths.generator_build().join("gen"), "#!/bin/sh\necho 3\n");

        std::fs::create_dir_all(paths.solutions()).unwrap();
        write_exec(&paths.solutions().join("model.sh"), "#!/bin/sh\nread n\necho $((n*2))\n");

        let config = ProblemConfig::parse(BATCH_YAML).unwrap();
        let recipe = tmt_recipe::parse_recipe("@testset main\ngen\n").unwrap();

        PipelineContext {
            config,
            paths,
            recipe,
            compiler_overrides: Default::default(),
        }
    }

    #[test]
    fn happy_batch_pipeline_marks_test_successful_and_writes_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = setup(tmp.path());

        let report = run_gen(&ctx, false).unwrap();

        assert_eq!(report.outcomes.len(), 1);
        let outcome = &report.outcomes[0];
        assert!(outcome.result.is_success(), "{:?}", outcome.result);
        assert!(outcome.result.is_well_formed());

        let summary = std::fs::read_to_string(ctx.paths.testcases_summary()).unwrap();
        assert_eq!(summary.trim(), outcome.codename);

        let hashes: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(ctx.paths.testcases_hashes()).unwrap()).unwrap();
        assert!(hashes.contains_key(&format!("{}.in", outcome.codename)));
        assert!(hashes.contains_key(&format!("{}.out", outcome.codename)));
    }

    #[test]
    fn rejected_input_skips_downstream_stages() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = setup(tmp.path());
        std::fs::create_dir_all(ctx.paths.validator_build()).unwrap();
        write_exec(&ctx.paths.validator_build().join("check"), "#!/bin/sh\nexit 1\n");

        let recipe = tmt_recipe::parse_recipe("@testset main\n@validation check\ngen\n").unwrap();
        let ctx = PipelineContext { recipe, ..ctx };

        let report = run_gen(&ctx, false).unwrap();
        let outcome = &report.outcomes[0];
        assert!(!outcome.result.is_success());
        assert!(outcome.result.is_well_formed());
        assert_eq!(outcome.result.output_generation, Some(ExecutionOutcome::Skipped));
        assert_eq!(outcome.result.output_validation, Some(ExecutionOutcome::Skipped));

        let summary = std::fs::read_to_string(ctx.paths.testcases_summary()).unwrap();
        assert!(summary.is_empty());
    }

    #[test]
    fn verify_hash_reports_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = setup(tmp.path());
        std::fs::create_dir_all(ctx.paths.testcases()).unwrap();
        std::fs::write(
            ctx.paths.testcases_hashes(),
            r#"{"ghost.in": "deadbeef"}"#,
        )
        .unwrap();

        let report = run_gen(&ctx, true).unwrap();
        let diff = report.hash_diff.unwrap();
        assert_eq!(diff.missing, vec!["ghost.in".to_string()]);
        assert!(!diff.is_clean());
    }

    #[test]
    fn hash_json_round_trips_with_sorted_keys_and_four_space_indent() {
        let mut map = BTreeMap::new();
        map.insert("b.out".to_string(), "222".to_string());
        map.insert("a.in".to_string(), "111".to_string());

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hash.json");
        write_hash_json(&path, &map).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\n    \"a.in\": \"111\",\n    \"b.out\": \"222\"\n}");

        let parsed: BTreeMap<String, String> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, map);
    }
}
