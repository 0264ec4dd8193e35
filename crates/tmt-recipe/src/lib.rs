//! The recipe DSL: parsing `tmt.recipe` files into an ordered sequence of
//! testsets, subtasks, and testcases (§3, §6b).

pub mod command;
pub mod parser;
pub mod types;

pub use command::{Command, Pipeline};
pub use parser::parse_recipe;
pub use types::{Recipe, Subtask, Testcase, Testset};
