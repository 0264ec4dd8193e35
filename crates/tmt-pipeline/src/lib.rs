//! The pipeline crate: ties the config/recipe/build/sandbox crates together
//! into the `gen`/`invoke` stage implementations and the orchestrator that
//! drives them (§4.4-§4.8), plus the one concrete exporter (§6a `export`).

pub mod checker;
pub mod context;
pub mod export;
pub mod generation;
pub mod invoke;
pub mod orchestrator;
pub mod solution;
pub mod validation;

pub use context::PipelineContext;
pub use export::export_icpc_package;
pub use invoke::{run_invoke, InvokeOutcome, InvokeReport};
pub use orchestrator::{GenReport, HashDiff, TestOutcome, run_gen};
