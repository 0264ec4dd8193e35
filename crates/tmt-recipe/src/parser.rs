//! Line-oriented recipe DSL parser (§6b).
//!
//! Grounded on `original_source::internal::recipe_parser.parse_recipe_data`
//! and its `CommandHandler` hierarchy: one pass over the recipe's lines,
//! dispatching `@directive` lines to a handler and everything else to
//! "add a testcase to whatever testset/subtask is currently open". Constant
//! expansion (`${NAME}`) happens once, as each line is consumed — there is
//! no second pass and no recursive expansion (§9).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use tmt_core::TmtError;

use crate::command::Pipeline;
use crate::types::{Recipe, Subtask, Testcase, Testset};

static CONSTANT_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Testset,
    Subtask,
}

/// Mutable parse state threaded through every directive handler, mirroring
/// `ParserContext` upstream.
struct ParserState {
    recipe: Recipe,
    current_context: Option<Context>,
    /// Index into `recipe.testsets`/`recipe.subtasks` of whichever one is
    /// currently open (selected by the most recent `@testset`/`@subtask`).
    current_index: usize,
    testset_counter: usize,
    subtask_counter: usize,
    used_names: HashSet<String>,
    constants: HashMap<String, String>,
}

impl ParserState {
    fn new() -> Self {
        Self {
            recipe: Recipe::default(),
            current_context: None,
            current_index: 0,
            testset_counter: 1,
            subtask_counter: 1,
            used_names: HashSet::new(),
            constants: HashMap::new(),
        }
    }

    fn set_constant(&mut self, name: &str, value: &str) -> Result<(), String> {
        if let Some(existing) = self.constants.get(name) {
            if existing != value {
                return Err(format!("redefinition on constant {name}"));
            }
            return Ok(());
        }
        self.constants.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn expand(&self, text: &str) -> Result<String, String> {
        let mut err = None;
        let expanded = CONSTANT_REF.replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            match self.constants.get(name) {
                Some(value) => value.clone(),
                None => {
                    err = Some(format!("undefined constant: ${{{name}}}"));
                    String::new()
                }
            }
        });
        match err {
            Some(e) => Err(e),
            None => Ok(expanded.into_owned()),
        }
    }

    fn expand_all<'a>(&self, parts: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>, String> {
        parts.into_iter().map(|p| self.expand(p)).collect()
    }

    fn current_testset(&mut self) -> &mut Testset {
        &mut self.recipe.testsets[self.current_index]
    }

    fn current_subtask(&mut self) -> &mut Subtask {
        &mut self.recipe.subtasks[self.current_index]
    }

    /// Auto-creates (and switches the subtask's `independent_testset_name`
    /// to) an inline testset named after the subtask, the first time a bare
    /// test line or `@extra_file` appears directly inside it — matching
    /// `Subtask.set_independent_testset` upstream.
    fn ensure_independent_testset(&mut self) -> Result<(), String> {
        debug_assert_eq!(self.current_context, Some(Context::Subtask));
        let subtask = self.current_subtask();
        if subtask.independent_testset_name.is_some() {
            return Ok(());
        }
        let name = subtask.name.clone();
        let index = self.testset_counter;
        self.testset_counter += 1;

        let testset = Testset::new(&name, index);
        self.recipe.testsets.push(testset);
        let subtask = self.current_subtask();
        subtask.independent_testset_name = Some(name.clone());
        subtask.included_testsets.insert(name);
        Ok(())
    }

    fn add_test_to_current(&mut self, command_sequence: &str) -> Result<(), String> {
        let expanded = self.expand(command_sequence)?;
        let pipeline = Pipeline::parse(&expanded)?;
        match self.current_context {
            Some(Context::Testset) => {
                self.current_testset().tests.push(Testcase::new(pipeline));
            }
            Some(Context::Subtask) => {
                self.ensure_independent_testset()?;
                let name = self.current_subtask().independent_testset_name.clone().unwrap();
                self.recipe
                    .testset_mut(&name)
                    .expect("independent testset just created")
                    .tests
                    .push(Testcase::new(pipeline));
            }
            None => return Err("a test line must appear inside a @testset or @subtask".into()),
        }
        Ok(())
    }
}

fn validate_args(directive: &str, parts: &[&str], min: usize, max: Option<usize>) -> Result<(), String> {
    let count = parts.len() - 1;
    if count < min {
        return Err(format!("@{directive} requires at least {min} argument(s)"));
    }
    if let Some(max) = max {
        if count > max {
            return Err(format!("@{directive} requires at most {max} argument(s)"));
        }
    }
    Ok(())
}

fn handle_testset(state: &mut ParserState, parts: &[&str]) -> Result<(), String> {
    validate_args("testset", parts, 1, Some(1))?;
    let name = parts[1];
    if state.used_names.contains(name) {
        return Err(format!("name '{name}' already used"));
    }
    state.used_names.insert(name.to_string());
    let index = state.testset_counter;
    state.testset_counter += 1;
    state.recipe.testsets.push(Testset::new(name, index));
    state.current_context = Some(Context::Testset);
    state.current_index = state.recipe.testsets.len() - 1;
    Ok(())
}

fn handle_subtask(state: &mut ParserState, parts: &[&str]) -> Result<(), String> {
    validate_args("subtask", parts, 2, Some(2))?;
    let name = parts[1];
    if state.used_names.contains(name) {
        return Err(format!("name '{name}' already used"));
    }
    let score: i64 = parts[2]
        .parse()
        .map_err(|_| format!("invalid score '{}' for subtask", parts[2]))?;
    state.used_names.insert(name.to_string());
    let index = state.subtask_counter;
    state.subtask_counter += 1;
    state.recipe.subtasks.push(Subtask::new(name, index, score));
    state.current_context = Some(Context::Subtask);
    state.current_index = state.recipe.subtasks.len() - 1;
    Ok(())
}

/// Validators run single-process (§4.5): a `|`-chained validator pipeline
/// is rejected here rather than deferred to the pipeline orchestrator.
fn reject_piped_validator(pipeline: &Pipeline) -> Result<(), String> {
    if pipeline.commands.len() > 1 {
        return Err("validation with pipe is not supported".into());
    }
    Ok(())
}

fn handle_global_validation(state: &mut ParserState, parts: &[&str]) -> Result<(), String> {
    validate_args("global_validation", parts, 1, None)?;
    let expanded = state.expand_all(parts[1..].iter().copied())?;
    let pipeline = Pipeline::parse(&expanded.join(" "))?;
    reject_piped_validator(&pipeline)?;
    state.recipe.global_validation.push(pipeline);
    state.current_context = None;
    Ok(())
}

fn handle_description(state: &mut ParserState, parts: &[&str]) -> Result<(), String> {
    validate_args("description", parts, 1, None)?;
    let expanded = state.expand_all(parts[1..].iter().copied())?;
    let description = expanded.join(" ");
    match state.current_context {
        Some(Context::Testset) => {
            let testset = state.current_testset();
            if testset.description.is_some() {
                return Err(format!("description already set for testset '{}'", testset.name));
            }
            testset.description = Some(description);
        }
        Some(Context::Subtask) => {
            let subtask = state.current_subtask();
            if subtask.description.is_some() {
                return Err(format!("description already set for subtask '{}'", subtask.name));
            }
            subtask.description = Some(description);
        }
        None => return Err("@description can only be used within testset or subtask context".into()),
    }
    Ok(())
}

fn handle_include(state: &mut ParserState, parts: &[&str]) -> Result<(), String> {
    validate_args("include", parts, 1, Some(1))?;
    if state.current_context != Some(Context::Subtask) {
        return Err("@include can only be used within subtask context".into());
    }
    let include_name = parts[1];

    if state.recipe.testset(include_name).is_some() {
        state.current_subtask().included_testsets.insert(include_name.to_string());
    } else if let Some(referenced) = state.recipe.subtask(include_name) {
        // Transitive include: every testset the referenced subtask itself
        // includes becomes part of this subtask's effective test set too.
        let transitively: BTreeSet<String> = referenced.included_testsets.clone();
        state.current_subtask().included_testsets.extend(transitively);
    } else {
        return Err(format!("unknown testset or subtask name: '{include_name}'"));
    }
    Ok(())
}

fn handle_validation(state: &mut ParserState, parts: &[&str]) -> Result<(), String> {
    validate_args("validation", parts, 1, None)?;
    let expanded = state.expand_all(parts[1..].iter().copied())?;
    let pipeline = Pipeline::parse(&expanded.join(" "))?;
    reject_piped_validator(&pipeline)?;
    match state.current_context {
        Some(Context::Testset) => state.current_testset().validation.push(pipeline),
        Some(Context::Subtask) => state.current_subtask().validation.push(pipeline),
        None => return Err("@validation can only be used within testset or subtask context".into()),
    }
    Ok(())
}

fn handle_constant(state: &mut ParserState, parts: &[&str]) -> Result<(), String> {
    validate_args("constant", parts, 2, Some(2))?;
    state.set_constant(parts[1], parts[2])
}

fn handle_extra_file(state: &mut ParserState, parts: &[&str]) -> Result<(), String> {
    validate_args("extra_file", parts, 2, Some(2))?;
    let (name, ext) = (parts[1], parts[2]);
    if ext.is_empty() || !ext.starts_with('.') {
        return Err(format!("extra file {ext} should start with a dot (.)"));
    }
    match state.current_context {
        Some(Context::Testset) => {
            let testset = state.current_testset();
            if !testset.extra_files.insert(ext.to_string()) {
                return Err(format!(
                    "extra file {ext} already added for testset '{}'",
                    testset.name
                ));
            }
        }
        Some(Context::Subtask) => {
            state.ensure_independent_testset()?;
            let name_of_testset = state.current_subtask().independent_testset_name.clone().unwrap();
            let testset = state.recipe.testset_mut(&name_of_testset).unwrap();
            if !testset.extra_files.insert(ext.to_string()) {
                return Err(format!("extra file {ext} already added for testset '{name_of_testset}'"));
            }
        }
        None => return Err("@extra_file can only be used within testset or subtask context".into()),
    }
    // Registers NAME as a constant whose expansion is a reserved placeholder
    // token; rewritten to the real canonical name once names are assigned.
    state.set_constant(name, &format!("_tmt_internal_testcase_name{ext}"))
}

fn dispatch(state: &mut ParserState, directive: &str, parts: &[&str]) -> Result<(), String> {
    match directive {
        "testset" => handle_testset(state, parts),
        "subtask" => handle_subtask(state, parts),
        "global_validation" => handle_global_validation(state, parts),
        "description" => handle_description(state, parts),
        "include" => handle_include(state, parts),
        "validation" => handle_validation(state, parts),
        "constant" => handle_constant(state, parts),
        "extra_file" => handle_extra_file(state, parts),
        other => Err(format!("unknown command: '@{other}'")),
    }
}

/// Parses a full recipe file's text into a [`Recipe`].
///
/// Canonical test names are assigned only after every line has been
/// consumed (padding widths depend on the final testset count), and each
/// test's effective validator list is the merge order documented in §3:
/// testset-scoped, then subtask-scoped (for testsets a subtask included),
/// then global — fixed once, at parse completion.
pub fn parse_recipe(text: &str) -> Result<Recipe, TmtError> {
    let mut state = ParserState::new();

    for (line_no, raw_line) in text.lines().enumerate() {
        let line_num = line_no + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let result = if let Some(rest) = line.strip_prefix('@') {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            if parts.is_empty() {
                Err("empty command after '@'".to_string())
            } else {
                dispatch(&mut state, parts[0], &parts)
            }
        } else {
            state.add_test_to_current(line)
        };

        result.map_err(|message| TmtError::RecipeSyntax {
            line: line_num,
            message,
        })?;
    }

    finalize(&mut state.recipe);
    Ok(state.recipe)
}

/// Post-processing done once, after every line is parsed: assign canonical
/// test names (padding widths need the final testset count) and merge each
/// test's effective validator list.
fn finalize(recipe: &mut Recipe) {
    if recipe.testsets.is_empty() {
        return;
    }
    let max_index = recipe.testsets.iter().map(|t| t.index).max().unwrap_or(1);
    let testset_index_width = max_index.to_string().len().max(1);
    for testset in &mut recipe.testsets {
        testset.generate_test_names(testset_index_width);
    }

    // testset-scoped validators first.
    let testset_validators: HashMap<String, Vec<Pipeline>> = recipe
        .testsets
        .iter()
        .map(|t| (t.name.clone(), t.validation.clone()))
        .collect();
    for testset in &mut recipe.testsets {
        for test in &mut testset.tests {
            test.validation.extend(testset_validators[&testset.name].iter().cloned());
        }
    }

    // subtask-scoped validators, for every testset the subtask includes.
    for subtask in &recipe.subtasks {
        for testset_name in &subtask.included_testsets {
            if let Some(testset) = recipe.testset_mut(testset_name) {
                for test in &mut testset.tests {
                    test.validation.extend(subtask.validation.iter().cloned());
                }
            }
        }
    }

    // global validators last.
    let global = recipe.global_validation.clone();
    for testset in &mut recipe.testsets {
        for test in &mut testset.tests {
            test.validation.extend(global.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
@constant MAX_N 200000
@constant SMALL_N 100

@testset t1
gen --N=${SMALL_N} seed=1
gen --N=${SMALL_N} seed=2

@testset edge_case
@extra_file NOTE .note
special --N=1 --note=${NOTE} seed=1
gen --N=${SMALL_N} seed=1 | make_extreme

@global_validation validator --N=${MAX_N}

@subtask s1 20
@include t1
@include edge_case
@validation validator --N=${SMALL_N}
"#;

    #[test]
    fn parses_testsets_and_assigns_names() {
        let recipe = parse_recipe(SAMPLE).unwrap();
        let t1 = recipe.testset("t1").unwrap();
        assert_eq!(t1.tests[0].test_name.as_deref(), Some("1_t1_1"));
        assert_eq!(t1.tests[1].test_name.as_deref(), Some("1_t1_2"));
    }

    #[test]
    fn expands_constants_in_test_lines() {
        let recipe = parse_recipe(SAMPLE).unwrap();
        let t1 = recipe.testset("t1").unwrap();
        assert_eq!(t1.tests[0].execute.commands[0].args[0], "--N=100");
    }

    #[test]
    fn piped_command_produces_two_commands() {
        let recipe = parse_recipe(SAMPLE).unwrap();
        let edge = recipe.testset("edge_case").unwrap();
        assert_eq!(edge.tests[1].execute.commands.len(), 2);
        assert_eq!(edge.tests[1].execute.commands[1].program, "make_extreme");
    }

    #[test]
    fn extra_file_placeholder_binds_to_test_name() {
        let recipe = parse_recipe(SAMPLE).unwrap();
        let edge = recipe.testset("edge_case").unwrap();
        let note_arg = &edge.tests[0].execute.commands[0].args[1];
        assert!(note_arg.starts_with("--note=1_edge_case_1.note"));
    }

    #[test]
    fn validator_merge_order_is_testset_then_subtask_then_global() {
        let recipe = parse_recipe(SAMPLE).unwrap();
        let t1 = recipe.testset("t1").unwrap();
        // t1 has no testset-scoped validator; subtask s1 adds one, global
        // adds another; subtask comes before global.
        let test = &t1.tests[0];
        assert_eq!(test.validation.len(), 2);
        assert_eq!(test.validation[0].commands[0].program, "validator");
        assert_eq!(test.validation[0].commands[0].args[0], "--N=100");
        assert_eq!(test.validation[1].commands[0].args[0], "--N=200000");
    }

    #[test]
    fn redefining_constant_with_same_value_is_ok() {
        let recipe = r#"
@constant N 10
@constant N 10
@testset t1
gen --N=${N}
"#;
        assert!(parse_recipe(recipe).is_ok());
    }

    #[test]
    fn redefining_constant_with_different_value_errors() {
        let recipe = r#"
@constant N 10
@constant N 20
@testset t1
gen --N=${N}
"#;
        let err = parse_recipe(recipe).unwrap_err();
        match err {
            TmtError::RecipeSyntax { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("redefinition"));
            }
            other => panic!("expected RecipeSyntax, got {other:?}"),
        }
    }

    #[test]
    fn undefined_constant_reference_errors() {
        let recipe = "@testset t1\ngen --N=${MISSING}\n";
        let err = parse_recipe(recipe).unwrap_err();
        assert!(matches!(err, TmtError::RecipeSyntax { .. }));
    }

    #[test]
    fn bare_test_line_inside_subtask_autocreates_independent_testset() {
        let recipe = r#"
@subtask s1 10
gen --N=5 seed=1
gen --N=5 seed=2
"#;
        let parsed = parse_recipe(recipe).unwrap();
        assert_eq!(parsed.testsets.len(), 1);
        assert_eq!(parsed.testsets[0].name, "s1");
        assert_eq!(parsed.testsets[0].tests.len(), 2);
    }

    #[test]
    fn subtask_transitive_include() {
        let recipe = r#"
@testset t1
gen --N=5

@testset t2
gen --N=50

@subtask a 10
@include t1

@subtask b 20
@include a
@include t2
"#;
        let parsed = parse_recipe(recipe).unwrap();
        let b = parsed.subtask("b").unwrap();
        assert!(b.included_testsets.contains("t1"));
        assert!(b.included_testsets.contains("t2"));
    }

    #[test]
    fn piped_validator_is_rejected() {
        let recipe = "@testset t1\ngen --N=5\n@validation check | extra\n";
        let err = parse_recipe(recipe).unwrap_err();
        match err {
            TmtError::RecipeSyntax { message, .. } => assert!(message.contains("pipe is not supported")),
            other => panic!("expected RecipeSyntax, got {other:?}"),
        }
    }

    #[test]
    fn include_of_unknown_name_errors() {
        let recipe = "@subtask a 10\n@include nope\n";
        let err = parse_recipe(recipe).unwrap_err();
        assert!(matches!(err, TmtError::RecipeSyntax { .. }));
    }

    #[test]
    fn padding_width_matches_testset_count() {
        let mut recipe_text = String::new();
        for i in 1..=12 {
            recipe_text.push_str(&format!("@testset t{i}\ngen --N=1\n"));
        }
        let recipe = parse_recipe(&recipe_text).unwrap();
        // 12 testsets -> width 2.
        assert_eq!(recipe.testset("t1").unwrap().tests[0].test_name.as_deref(), Some("01_t1_1"));
        assert_eq!(recipe.testset("t12").unwrap().tests[0].test_name.as_deref(), Some("12_t12_1"));
    }

    #[test]
    fn all_test_names_sorted_by_testset_index() {
        let recipe = parse_recipe(SAMPLE).unwrap();
        let names = recipe.all_test_names();
        assert_eq!(names[0], "1_t1_1");
        assert_eq!(names[1], "1_t1_2");
    }
}
