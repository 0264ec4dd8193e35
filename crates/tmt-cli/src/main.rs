mod cli;
mod clean_cmd;
mod export_cmd;
mod gen_cmd;
mod invoke_cmd;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tmt_sandbox::install_interrupt_handler();

    if let Err(err) = run() {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;
    let problem_dir = tmt_config::find_problem_dir(&cwd)?;

    match cli.command {
        Commands::Gen { show_reason, verify_hash } => gen_cmd::run(&problem_dir, show_reason, verify_hash),
        Commands::Invoke { show_reason, submissions } => invoke_cmd::run(&problem_dir, show_reason, &submissions),
        Commands::Clean { yes } => clean_cmd::run(&problem_dir, yes),
        Commands::Export { output } => export_cmd::run(&problem_dir, &output),
    }
}
