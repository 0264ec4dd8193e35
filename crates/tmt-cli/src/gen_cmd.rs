//! `tmt gen` (§6a): runs the pipeline orchestrator and prints a per-test
//! report, matching the teacher's `plan_display::print_summary` texture
//! (a status tag, the name, and an optional reason line).

use std::path::Path;

use anyhow::{Result, bail};

pub fn run(problem_dir: &Path, show_reason: bool, verify_hash: bool) -> Result<()> {
    let ctx = tmt_pipeline::PipelineContext::load(problem_dir)?;
    let report = tmt_pipeline::run_gen(&ctx, verify_hash)?;

    let mut passed = 0;
    for outcome in &report.outcomes {
        let ok = outcome.result.is_success();
        if ok {
            passed += 1;
        }
        println!("{:4} {}", if ok { "OK" } else { "FAIL" }, outcome.codename);
        if show_reason && !ok && !outcome.result.reason.is_empty() {
            println!("     {}", outcome.result.reason);
        }
    }

    let total = report.outcomes.len();
    println!();
    println!("{passed}/{total} testcases generated successfully");

    let mut hash_clean = true;
    if let Some(diff) = &report.hash_diff {
        hash_clean = diff.is_clean();
        if hash_clean {
            println!("hash verification: clean");
        } else {
            println!("hash verification: MISMATCH");
            for name in &diff.mismatched {
                println!("  mismatched: {name}");
            }
            for name in &diff.missing {
                println!("  missing:    {name}");
            }
            for name in &diff.extra {
                println!("  extra:      {name}");
            }
        }
    }

    if passed != total {
        bail!("{} of {total} testcase(s) failed to generate", total - passed);
    }
    if !hash_clean {
        bail!("hash verification found differences against the stored hash.json");
    }
    Ok(())
}
