//! The build driver (§4.3): compiles generators/validators/checkers/
//! solutions/interactors through a closed set of language descriptors and
//! an external `make` invocation, under the trusted-tooling sandbox limits.

pub mod driver;
pub mod language;

pub use driver::{CompilerOverride, clean, compile_target, compile_wildcard};
pub use language::{Language, MakeKind};
