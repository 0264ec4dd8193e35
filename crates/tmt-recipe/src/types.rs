//! Recipe data model: testsets, subtasks, and the testcases they own.
//!
//! Grounded on `original_source::internal::recipe_parser` (`Testset`,
//! `Subtask`, `Testcase`, `RecipeData`), adapted from mutable Python
//! containers into plain Rust structs assembled by [`crate::parser`].

use std::collections::BTreeSet;

use crate::command::Pipeline;

/// One test case: its generation pipeline plus the validators that apply
/// to it (testset ∪ subtask ∪ global, in that order — see
/// [`crate::parser`]).
#[derive(Debug, Clone)]
pub struct Testcase {
    pub execute: Pipeline,
    pub validation: Vec<Pipeline>,
    pub test_name: Option<String>,
}

impl Testcase {
    pub fn new(execute: Pipeline) -> Self {
        Self {
            execute,
            validation: Vec::new(),
            test_name: None,
        }
    }

    pub fn set_test_name(&mut self, test_name: &str) {
        self.execute.bind_test_name(test_name);
        for validator in &mut self.validation {
            validator.bind_test_name(test_name);
        }
        self.test_name = Some(test_name.to_string());
    }
}

/// A named, ordered sequence of [`Testcase`]s plus the extra output file
/// extensions every test in it produces.
#[derive(Debug, Clone)]
pub struct Testset {
    pub name: String,
    pub index: usize,
    pub description: Option<String>,
    pub validation: Vec<Pipeline>,
    pub tests: Vec<Testcase>,
    pub extra_files: BTreeSet<String>,
}

impl Testset {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            description: None,
            validation: Vec::new(),
            tests: Vec::new(),
            extra_files: BTreeSet::new(),
        }
    }

    /// Assigns canonical names to every test in this testset:
    /// `{testset_idx zero-padded to testset_index_width}_{name}_{case_idx
    /// zero-padded to this testset's own test count}`.
    pub fn generate_test_names(&mut self, testset_index_width: usize) {
        let case_width = self.tests.len().to_string().len().max(1);
        for (i, test) in self.tests.iter_mut().enumerate() {
            let test_name = format!(
                "{:0tw$}_{}_{:0cw$}",
                self.index,
                self.name,
                i + 1,
                tw = testset_index_width,
                cw = case_width,
            );
            test.set_test_name(&test_name);
        }
    }
}

/// A named, scored group of testsets. May own an *independent testset*
/// (auto-created the first time a bare test line or `@extra_file`
/// appears directly inside the subtask, before any `@include`).
#[derive(Debug, Clone)]
pub struct Subtask {
    pub name: String,
    pub index: usize,
    pub score: i64,
    pub description: Option<String>,
    pub validation: Vec<Pipeline>,
    /// Names of testsets this subtask's effective test set includes.
    pub included_testsets: BTreeSet<String>,
    /// Set once a bare test line or `@extra_file` is seen directly inside
    /// this subtask (matching `Subtask.independent_testset` upstream).
    pub independent_testset_name: Option<String>,
}

impl Subtask {
    pub fn new(name: impl Into<String>, index: usize, score: i64) -> Self {
        Self {
            name: name.into(),
            index,
            score,
            description: None,
            validation: Vec::new(),
            included_testsets: BTreeSet::new(),
            independent_testset_name: None,
        }
    }
}

/// The fully parsed recipe: every testset and subtask, plus global
/// validators applied to every test in the recipe.
#[derive(Debug, Clone, Default)]
pub struct Recipe {
    pub testsets: Vec<Testset>,
    pub subtasks: Vec<Subtask>,
    pub global_validation: Vec<Pipeline>,
}

impl Recipe {
    pub fn testset(&self, name: &str) -> Option<&Testset> {
        self.testsets.iter().find(|t| t.name == name)
    }

    pub fn testset_mut(&mut self, name: &str) -> Option<&mut Testset> {
        self.testsets.iter_mut().find(|t| t.name == name)
    }

    pub fn subtask(&self, name: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.name == name)
    }

    /// All test names in testset-index order, the order `command_gen`
    /// iterates them in.
    pub fn all_test_names(&self) -> Vec<&str> {
        let mut testsets: Vec<&Testset> = self.testsets.iter().collect();
        testsets.sort_by_key(|t| t.index);
        testsets
            .into_iter()
            .flat_map(|t| t.tests.iter())
            .filter_map(|t| t.test_name.as_deref())
            .collect()
    }
}
