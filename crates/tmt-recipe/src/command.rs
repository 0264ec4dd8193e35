//! A single `(program, args)` pair and the pipe-separated sequence that
//! makes up one testcase's generation command or one validator invocation.
//!
//! Grounded on `original_source::internal::recipe_parser.Executable`: split
//! a `|`-separated line into whitespace-separated argv lists.

use tmt_core::TmtError;

/// One program invocation: `program` is the first whitespace-separated
/// token, `args` the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
}

impl Command {
    fn parse_one(text: &str) -> Result<Self, String> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        let Some((program, args)) = parts.split_first() else {
            return Err("empty command found in sequence".into());
        };
        Ok(Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn is_manual(&self) -> bool {
        self.program == "manual"
    }
}

/// A pipe-chained sequence of [`Command`]s, e.g. `gen --N=10 | shuffle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
}

impl Pipeline {
    pub fn parse(command_sequence: &str) -> Result<Self, String> {
        if command_sequence.trim().is_empty() {
            return Err("command sequence cannot be empty".into());
        }
        let mut commands = Vec::new();
        for piece in command_sequence.split('|') {
            let piece = piece.trim();
            if piece.is_empty() {
                return Err("empty command found in sequence".into());
            }
            commands.push(Command::parse_one(piece)?);
        }
        Ok(Self { commands })
    }

    /// Substitutes the reserved `_tmt_internal_testcase_name` token (used by
    /// `@extra_file` placeholders) with the real canonical test name, once
    /// it has been assigned.
    pub fn bind_test_name(&mut self, test_name: &str) {
        for command in &mut self.commands {
            for arg in std::iter::once(&mut command.program).chain(command.args.iter_mut()) {
                if arg.contains("_tmt_internal_testcase_name") {
                    *arg = arg.replace("_tmt_internal_testcase_name", test_name);
                }
            }
        }
    }

    pub fn single(&self) -> Result<&Command, TmtError> {
        if self.commands.len() != 1 {
            return Err(TmtError::ConfigInvalid(
                "validation with pipe is not supported".into(),
            ));
        }
        Ok(&self.commands[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_command() {
        let pipeline = Pipeline::parse("gen --N=10 seed=1").unwrap();
        assert_eq!(pipeline.commands.len(), 1);
        assert_eq!(pipeline.commands[0].program, "gen");
        assert_eq!(pipeline.commands[0].args, vec!["--N=10", "seed=1"]);
    }

    #[test]
    fn parses_piped_sequence() {
        let pipeline = Pipeline::parse("gen --N=${SMALL_N} | make_extreme").unwrap();
        assert_eq!(pipeline.commands.len(), 2);
        assert_eq!(pipeline.commands[1].program, "make_extreme");
    }

    #[test]
    fn rejects_empty_sequence() {
        assert!(Pipeline::parse("   ").is_err());
    }

    #[test]
    fn rejects_empty_piped_segment() {
        assert!(Pipeline::parse("gen --N=10 | ").is_err());
    }

    #[test]
    fn single_rejects_multi_command_pipeline() {
        let pipeline = Pipeline::parse("gen | extra").unwrap();
        assert!(pipeline.single().is_err());
    }

    #[test]
    fn bind_test_name_replaces_placeholder_token() {
        let mut pipeline = Pipeline::parse("gen --note=_tmt_internal_testcase_name.note").unwrap();
        pipeline.bind_test_name("01_edge_01");
        assert_eq!(pipeline.commands[0].args[0], "--note=01_edge_01.note");
    }
}
