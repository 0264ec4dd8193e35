//! The `export` boundary (§6a, §6c): writes a problem out in the ICPC
//! package convention understood by DOMjudge/Kattis-style judges. One
//! concrete exporter; other conventions are left to a closed enum a future
//! variant would extend.
//!
//! Grounded on `original_source::commands::export`'s file-copy-plus-
//! metadata-translation shape (walk `testcases/summary`, copy each pair
//! into the target layout, then emit one small metadata file) and on the
//! teacher's `audit/io.rs` write-to-temp-then-rename save pattern for the
//! metadata file itself.

use std::io::Write;
use std::path::Path;

use tmt_config::ProblemPaths;
use tmt_core::TmtError;

use crate::context::PipelineContext;

const SECRET_DATA_DIR: &str = "data/secret";

/// Copies every successful testcase and a `domjudge-problem.ini` summary
/// into `output_dir`, matching the ICPC package layout. Returns the number
/// of testcases copied.
pub fn export_icpc_package(ctx: &PipelineContext, output_dir: &Path) -> Result<usize, TmtError> {
    let secret_dir = output_dir.join(SECRET_DATA_DIR);
    std::fs::create_dir_all(&secret_dir)?;

    let codenames = read_summary(&ctx.paths)?;
    for codename in &codenames {
        copy_testcase(&ctx.paths, &secret_dir, codename, &ctx.config.input_extension, ".in")?;
        copy_testcase(&ctx.paths, &secret_dir, codename, &ctx.config.output_extension, ".ans")?;
    }

    write_domjudge_ini(ctx, output_dir)?;
    Ok(codenames.len())
}

pub(crate) fn read_summary(paths: &ProblemPaths) -> Result<Vec<String>, TmtError> {
    let text = std::fs::read_to_string(paths.testcases_summary()).map_err(|_| TmtError::ConfigMissing {
        filetype: "testcase summary".into(),
        path: paths.testcases_summary(),
    })?;
    Ok(text.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
}

fn copy_testcase(
    paths: &ProblemPaths,
    secret_dir: &Path,
    codename: &str,
    source_ext: &str,
    target_ext: &str,
) -> Result<(), TmtError> {
    let source = paths.testcases().join(format!("{codename}{source_ext}"));
    let target = secret_dir.join(format!("{codename}{target_ext}"));
    std::fs::copy(&source, &target).map_err(|_| TmtError::ConfigMissing {
        filetype: "testcase".into(),
        path: source,
    })?;
    Ok(())
}

/// `domjudge-problem.ini` is the one metadata file every ICPC package
/// needs: short name and the time limit (in whole seconds, rounded up, per
/// the convention's integer-only grammar). Written atomically (temp file,
/// then rename) the same way the metadata file in the teacher's audit
/// module is saved.
fn write_domjudge_ini(ctx: &PipelineContext, output_dir: &Path) -> Result<(), TmtError> {
    let timelimit = ctx.config.solution.time_limit_sec.ceil() as u64;
    let body = format!(
        "short-name = {}\ntimelimit = {}\n",
        ctx.config.short_name, timelimit
    );

    let path = output_dir.join("domjudge-problem.ini");
    let tmp_path = path.with_extension("ini.tmp");
    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(body.as_bytes())?;
    file.flush()?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
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
  time_limit: "1500ms"
  memory_limit: "256MB"
  output_limit: "64MB"
answer_generation:
  type: solution
  filename: model.cpp
"#;

    fn setup(tmp: &Path) -> PipelineContext {
        let paths = ProblemPaths::new(tmp);
        std::fs::create_dir_all(paths.testcases()).unwrap();
        std::fs::write(paths.testcases().join("01_t_01.in"), "1 2\n").unwrap();
        std::fs::write(paths.testcases().join("01_t_01.out"), "3\n").unwrap();
        std::fs::write(paths.testcases_summary(), "01_t_01\n").unwrap();

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
    fn export_copies_testcases_and_writes_ini() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = setup(tmp.path());
        let out = tmp.path().join("package");

        let count = export_icpc_package(&ctx, &out).unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            std::fs::read_to_string(out.join("data/secret/01_t_01.in")).unwrap(),
            "1 2\n"
        );
        assert_eq!(
            std::fs::read_to_string(out.join("data/secret/01_t_01.ans")).unwrap(),
            "3\n"
        );
        let ini = std::fs::read_to_string(out.join("domjudge-problem.ini")).unwrap();
        assert!(ini.contains("short-name = aplusb"));
        assert!(ini.contains("timelimit = 2"));
    }

    #[test]
    fn export_errors_on_missing_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        let config = ProblemConfig::parse(BATCH_YAML).unwrap();
        let recipe = tmt_recipe::parse_recipe("@testset main\ngen\n").unwrap();
        let ctx = PipelineContext {
            config,
            paths,
            recipe,
            compiler_overrides: Default::default(),
        };

        let result = export_icpc_package(&ctx, &tmp.path().join("out"));
        assert!(result.is_err());
    }
}
