//! `tmt clean` (§6a): removes logs/sandbox, testcases, and compiled
//! artifacts behind three independent confirmation prompts (skipped
//! entirely with `-y`/`--yes`). Confirmation prompting itself is out of
//! the core's scope (§1 "Out of scope"); this is the thin CLI boundary
//! that owns it.

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub fn run(problem_dir: &Path, yes: bool) -> Result<()> {
    let paths = tmt_config::ProblemPaths::new(problem_dir);

    if yes || confirm("Remove logs/ and sandbox/?")? {
        paths.clean_logs()?;
        paths.clean_sandbox()?;
        println!("removed logs/ and sandbox/");
    }

    if yes || confirm("Remove testcases/?")? {
        paths.clean_testcases()?;
        println!("removed testcases/");
    }

    if yes || confirm("Remove compiled artifacts (generator/validator/checker/interactor/solutions build output)?")? {
        tmt_build::clean(&paths.generator())?;
        tmt_build::clean(&paths.validator())?;
        tmt_build::clean(&paths.checker())?;
        tmt_build::clean(&paths.interactor())?;
        tmt_build::clean(&paths.solutions())?;
        println!("removed compiled artifacts");
    }

    Ok(())
}
