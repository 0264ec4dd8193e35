//! `tmt export` (§6a): writes the problem package in the ICPC convention.

use std::path::Path;

use anyhow::Result;

pub fn run(problem_dir: &Path, output: &Path) -> Result<()> {
    let ctx = tmt_pipeline::PipelineContext::load(problem_dir)?;
    let count = tmt_pipeline::export_icpc_package(&ctx, output)?;
    println!("exported {count} testcase(s) to {}", output.display());
    Ok(())
}
