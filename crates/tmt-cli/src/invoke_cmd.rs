//! `tmt invoke` (§6a): compiles each submission and grades it against
//! every testcase named in `testcases/summary`, printing a per-test
//! verdict/CPU/RSS line in the same texture as `gen_cmd`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tmt_core::EvaluationOutcome;

pub fn run(problem_dir: &Path, show_reason: bool, submissions: &[PathBuf]) -> Result<()> {
    let ctx = tmt_pipeline::PipelineContext::load(problem_dir)?;

    let mut any_rejected = false;
    for submission in submissions {
        println!("== {} ==", submission.display());
        let report = tmt_pipeline::run_invoke(&ctx, submission)?;

        if !report.unavailable_testcases.is_empty() {
            println!(
                "warning: testcases {} were not available (generate them first)",
                report.unavailable_testcases.join(", ")
            );
        }
        if report.apport_active {
            println!(
                "warning: apport.service is active; a signaled crash may be misread as a wall-clock timeout"
            );
        }

        for outcome in &report.outcomes {
            let accepted = matches!(
                outcome.verdict,
                EvaluationOutcome::RunSuccess | EvaluationOutcome::Accepted
            );
            if !accepted {
                any_rejected = true;
            }
            println!(
                "    {:<20} {:<10} {:6.3} s / {:7.1} MiB",
                outcome.codename,
                outcome.verdict.to_string(),
                outcome.cpu_time_sec,
                outcome.max_rss_kib as f64 / 1024.0,
            );
            if show_reason && !accepted && !outcome.reason.is_empty() {
                println!("        {}", outcome.reason);
            }
        }
        println!();
    }

    if any_rejected {
        bail!("one or more testcases were not accepted");
    }
    Ok(())
}
