//! Ties the per-problem configuration, directory layout, and parsed recipe
//! together into the one object every stage borrows from.
//!
//! Grounded on `original_source::internal::context.TMTContext`, which plays
//! the same role (it bundles `config`, `path`, and `recipe` and is threaded
//! through every step).

use std::collections::HashMap;
use std::path::Path;

use tmt_build::CompilerOverride;
use tmt_config::{CompilerOverrides, ProblemConfig, ProblemPaths};
use tmt_core::TmtError;
use tmt_recipe::Recipe;

pub struct PipelineContext {
    pub config: ProblemConfig,
    pub paths: ProblemPaths,
    pub recipe: Recipe,
    pub compiler_overrides: HashMap<String, CompilerOverride>,
}

impl PipelineContext {
    /// Loads `problem.yaml`, the optional `compiler.yaml`, and the recipe
    /// file from `problem_dir`.
    pub fn load(problem_dir: &Path) -> Result<Self, TmtError> {
        let paths = ProblemPaths::new(problem_dir);

        let problem_yaml = std::fs::read_to_string(paths.problem_yaml()).map_err(|_| {
            TmtError::ConfigMissing {
                filetype: "problem.yaml".into(),
                path: paths.problem_yaml(),
            }
        })?;
        let config = ProblemConfig::parse(&problem_yaml)?;

        let compiler_overrides = if paths.compiler_yaml().is_file() {
            let text = std::fs::read_to_string(paths.compiler_yaml()).map_err(TmtError::Io)?;
            CompilerOverrides::parse(&text)?
                .languages
                .into_iter()
                .map(|(name, over)| {
                    (
                        name,
                        CompilerOverride {
                            compiler: over.compiler,
                            extra_flags: over.flags,
                        },
                    )
                })
                .collect()
        } else {
            HashMap::new()
        };

        let recipe_text = std::fs::read_to_string(paths.recipe()).map_err(|_| {
            TmtError::ConfigMissing {
                filetype: "recipe".into(),
                path: paths.recipe(),
            }
        })?;
        let recipe = tmt_recipe::parse_recipe(&recipe_text)?;

        Ok(Self {
            config,
            paths,
            recipe,
            compiler_overrides,
        })
    }

    pub fn trusted_step_limits(&self) -> tmt_sandbox::Limits {
        tmt_sandbox::Limits {
            time_limit_sec: self.config.trusted.step_time_limit_sec,
            memory_limit_mib: self.config.trusted.step_memory_limit_mib,
            output_limit_mib: self.config.trusted.step_output_limit_mib,
        }
    }

    /// The tight limits applied to a contestant solution or submission,
    /// as opposed to [`Self::trusted_step_limits`]'s generous first-party
    /// caps.
    pub fn solution_limits(&self) -> tmt_sandbox::Limits {
        tmt_sandbox::Limits {
            time_limit_sec: self.config.solution.time_limit_sec,
            memory_limit_mib: self.config.solution.memory_limit_mib,
            output_limit_mib: self.config.solution.output_limit_mib,
        }
    }

    pub fn construct_input_filename(&self, codename: &str) -> String {
        self.paths
            .construct_test_filename(codename, &self.config.input_extension)
    }

    pub fn construct_output_filename(&self, codename: &str) -> String {
        self.paths
            .construct_test_filename(codename, &self.config.output_extension)
    }
}
