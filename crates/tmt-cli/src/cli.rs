use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tmt", version, about = "Testcase generation and grading pipeline for competitive-programming problems")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate, validate, and bake every testcase named by the recipe
    Gen {
        /// Print each failing testcase's reason alongside its verdict
        #[arg(long)]
        show_reason: bool,

        /// Diff the freshly computed hashes against the stored `hash.json`
        #[arg(long)]
        verify_hash: bool,
    },

    /// Compile and run one or more submissions against every successful testcase
    Invoke {
        /// Print the checker's reason alongside every non-accepted verdict
        #[arg(long)]
        show_reason: bool,

        /// Submission source files, one per submission
        #[arg(required = true)]
        submissions: Vec<PathBuf>,
    },

    /// Remove logs, sandbox state, testcases, and compiled artifacts
    Clean {
        /// Skip the interactive confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Export the problem package in the ICPC package convention
    Export {
        /// Directory to write the package into (created if missing)
        output: PathBuf,
    },
}
