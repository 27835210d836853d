//! Whole-model compilation: constants, variables, and command tables.

use std::collections::{HashMap, HashSet};

use stocha_eval::{
    optimize_double_expression, optimize_int_expression, CompiledExpression, Evaluator,
    RegisterCounts,
};
use stocha_syntax::{Distribution, Expression, Model, ModelType, Type, TypedValue};
use tracing::{debug, info};

use crate::compile::{compile_expression, IdentifierInfo};
use crate::error::CompileError;

/// A validated state variable.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledVariable {
    pub name: String,
    pub variable_type: Type,
    pub index: usize,
    pub min: i64,
    pub max: i64,
    pub init: i64,
}

/// A distribution parameter: folded to a literal when constant, else an
/// expression evaluated against the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledParameter {
    Literal(f64),
    Expression(CompiledExpression),
}

impl CompiledParameter {
    pub fn value(&self, evaluator: &mut Evaluator, state: &[i64]) -> f64 {
        match self {
            CompiledParameter::Literal(value) => *value,
            CompiledParameter::Expression(expr) => evaluator.evaluate_double(expr, state),
        }
    }

    fn from_expression(expr: CompiledExpression) -> CompiledParameter {
        match expr.as_double_constant() {
            Some(value) => CompiledParameter::Literal(value),
            None => CompiledParameter::Expression(expr),
        }
    }

    fn register_counts(&self) -> RegisterCounts {
        match self {
            CompiledParameter::Literal(_) => RegisterCounts::default(),
            CompiledParameter::Expression(expr) => expr.register_counts(),
        }
    }
}

/// Tag distinguishing the supported delay distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionType {
    Memoryless,
    Weibull,
    Lognormal,
    Uniform,
}

/// A general (non-memoryless) delay distribution.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledGsmpDistribution {
    Weibull {
        scale: CompiledParameter,
        shape: CompiledParameter,
    },
    Lognormal {
        scale: CompiledParameter,
        shape: CompiledParameter,
    },
    Uniform {
        low: CompiledParameter,
        high: CompiledParameter,
    },
}

impl CompiledGsmpDistribution {
    pub fn distribution_type(&self) -> DistributionType {
        match self {
            CompiledGsmpDistribution::Weibull { .. } => DistributionType::Weibull,
            CompiledGsmpDistribution::Lognormal { .. } => DistributionType::Lognormal,
            CompiledGsmpDistribution::Uniform { .. } => DistributionType::Uniform,
        }
    }

    fn parameters(&self) -> [&CompiledParameter; 2] {
        match self {
            CompiledGsmpDistribution::Weibull { scale, shape }
            | CompiledGsmpDistribution::Lognormal { scale, shape } => [scale, shape],
            CompiledGsmpDistribution::Uniform { low, high } => [low, high],
        }
    }
}

/// Assignment of an evaluated expression to a state variable.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledUpdate {
    pub variable: usize,
    pub expr: CompiledExpression,
}

/// One probabilistic branch of a Markov command.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMarkovOutcome {
    pub probability: CompiledParameter,
    pub updates: Vec<CompiledUpdate>,
}

/// A memoryless command: unit-step weight for DTMC, exponential rate for
/// CTMC/GSMP races.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMarkovCommand {
    pub module: Option<usize>,
    pub guard: CompiledExpression,
    pub weight: CompiledParameter,
    pub outcomes: Vec<CompiledMarkovOutcome>,
}

/// A command with a general delay distribution.
///
/// `first_index` anchors a contiguous block of trigger-time slots, one
/// slot per composite instantiation with synchronized partner commands.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledGsmpCommand {
    pub module: Option<usize>,
    pub guard: CompiledExpression,
    pub delay: CompiledGsmpDistribution,
    pub updates: Vec<CompiledUpdate>,
    pub first_index: usize,
}

/// Commands synchronized on one action across several modules; a composite
/// transition picks one enabled command from every module.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoredMarkovAction {
    pub action: String,
    /// Per participating module, in module order.
    pub modules: Vec<Vec<CompiledMarkovCommand>>,
}

/// A synchronized action whose delay is general. Exactly one module owns
/// the delay distribution; the partner modules contribute memoryless
/// commands whose updates fire together with the owner's.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoredGsmpAction {
    pub action: String,
    pub gsmp_commands: Vec<CompiledGsmpCommand>,
    /// Partner modules, in module order, excluding the owner.
    pub markov_commands: Vec<Vec<CompiledMarkovCommand>>,
}

/// The executable model handed to the simulator.
#[derive(Debug, Clone, Default)]
pub struct CompiledModel {
    pub model_type: ModelType,
    pub variables: Vec<CompiledVariable>,
    pub single_markov_commands: Vec<CompiledMarkovCommand>,
    pub factored_markov_commands: Vec<FactoredMarkovAction>,
    pub single_gsmp_commands: Vec<CompiledGsmpCommand>,
    pub factored_gsmp_commands: Vec<FactoredGsmpAction>,
    pub gsmp_event_count: usize,
    register_counts: RegisterCounts,
}

impl CompiledModel {
    /// Compile and validate a parsed model. `overrides` supplies or
    /// replaces constant values by name.
    pub fn make(
        model: &Model,
        overrides: &HashMap<String, TypedValue>,
    ) -> Result<CompiledModel, Vec<CompileError>> {
        let mut compiler = ModelCompiler {
            model,
            overrides,
            errors: Vec::new(),
            constants: HashMap::new(),
            failed_constants: HashSet::new(),
            identifiers: HashMap::new(),
            formulas: HashMap::new(),
            variables: Vec::new(),
        };
        let compiled = compiler.run();
        if compiler.errors.is_empty() {
            Ok(compiled)
        } else {
            Err(compiler.errors)
        }
    }

    /// Initial value of every state variable, in variable order.
    pub fn init_values(&self) -> Vec<i64> {
        self.variables.iter().map(|v| v.init).collect()
    }

    pub fn gsmp_event_count(&self) -> usize {
        self.gsmp_event_count
    }

    /// Component-wise maximum of register counts across every expression
    /// in the model: one evaluator sized with this handles them all.
    pub fn register_counts(&self) -> RegisterCounts {
        self.register_counts
    }
}

struct ModelCompiler<'a> {
    model: &'a Model,
    overrides: &'a HashMap<String, TypedValue>,
    errors: Vec<CompileError>,
    /// Resolved constant values, grown as the dependency DFS completes.
    constants: HashMap<String, IdentifierInfo>,
    /// Constants that already failed to resolve; dependents bail without
    /// piling on follow-on errors.
    failed_constants: HashSet<String>,
    /// Constants plus variables, for command compilation.
    identifiers: HashMap<String, IdentifierInfo>,
    formulas: HashMap<String, Expression>,
    variables: Vec<CompiledVariable>,
}

impl<'a> ModelCompiler<'a> {
    fn run(&mut self) -> CompiledModel {
        self.check_duplicates();
        self.resolve_constants();
        self.compile_variables();
        let model = self.model;
        for formula in &model.formulas {
            self.formulas
                .insert(formula.name.clone(), formula.expr.clone());
        }
        let (single_markov, factored_markov, single_gsmp, factored_gsmp) = self.compile_commands();

        let mut compiled = CompiledModel {
            model_type: self.model.model_type,
            variables: std::mem::take(&mut self.variables),
            single_markov_commands: single_markov,
            factored_markov_commands: factored_markov,
            single_gsmp_commands: single_gsmp,
            factored_gsmp_commands: factored_gsmp,
            gsmp_event_count: 0,
            register_counts: RegisterCounts::default(),
        };
        assign_trigger_slots(&mut compiled);
        compiled.register_counts = collect_register_counts(&compiled);

        info!(
            variables = compiled.variables.len(),
            single_markov = compiled.single_markov_commands.len(),
            factored_markov = compiled.factored_markov_commands.len(),
            single_gsmp = compiled.single_gsmp_commands.len(),
            factored_gsmp = compiled.factored_gsmp_commands.len(),
            gsmp_slots = compiled.gsmp_event_count,
            errors = self.errors.len(),
            "compiled model"
        );
        compiled
    }

    fn error(&mut self, error: CompileError) {
        self.errors.push(error);
    }

    fn check_duplicates(&mut self) {
        let model = self.model;
        let mut seen = HashSet::new();
        let names = model
            .constants
            .iter()
            .map(|c| &c.name)
            .chain(model.variables.iter().map(|v| &v.name))
            .chain(model.formulas.iter().map(|f| &f.name));
        for name in names {
            if !seen.insert(name.clone()) {
                self.errors
                    .push(CompileError::DuplicateIdentifier(name.clone()));
            }
        }
    }

    // -- constants ------------------------------------------------------

    fn resolve_constants(&mut self) {
        let model = self.model;
        let overrides = self.overrides;
        let by_name: HashMap<&str, usize> = model
            .constants
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.as_str(), i))
            .collect();
        for name in overrides.keys() {
            if !by_name.contains_key(name.as_str()) {
                self.errors.push(CompileError::UnknownOverride(name.clone()));
            }
        }
        let mut visiting = Vec::new();
        for constant in &model.constants {
            self.resolve_constant(&constant.name, &by_name, &mut visiting);
        }
    }

    /// Depth-first resolution over the constant dependency graph. Returns
    /// false when the constant could not be resolved; dependents bail out
    /// without reporting follow-on errors of their own.
    fn resolve_constant(
        &mut self,
        name: &str,
        by_name: &HashMap<&str, usize>,
        visiting: &mut Vec<String>,
    ) -> bool {
        if self.constants.contains_key(name) {
            return true;
        }
        if self.failed_constants.contains(name) {
            return false;
        }
        if visiting.iter().any(|v| v == name) {
            self.error(CompileError::CyclicConstant(name.to_string()));
            self.failed_constants.insert(name.to_string());
            return false;
        }
        let Some(&index) = by_name.get(name) else {
            // Not a constant; expression compilation reports unresolved
            // names itself.
            return true;
        };
        let model = self.model;
        let overrides = self.overrides;
        let constant = &model.constants[index];

        if let Some(value) = overrides.get(name) {
            let value = match (value, constant.constant_type) {
                (v, t) if v.value_type() == t => *value,
                (TypedValue::Int(n), Type::Double) => TypedValue::Double(*n as f64),
                (v, t) => {
                    self.error(CompileError::TypeMismatch {
                        expected: t.to_string(),
                        found: v.value_type(),
                    });
                    self.failed_constants.insert(name.to_string());
                    return false;
                }
            };
            self.define_constant(name, value);
            return true;
        }

        let Some(init) = &constant.init else {
            self.error(CompileError::UninitializedConstant(name.to_string()));
            self.failed_constants.insert(name.to_string());
            return false;
        };

        let mut dependencies = Vec::new();
        init.collect_identifiers(&mut dependencies);
        visiting.push(name.to_string());
        let deps_ok = dependencies
            .iter()
            .all(|dep| self.resolve_constant(dep, by_name, visiting));
        visiting.pop();
        if !deps_ok {
            self.failed_constants.insert(name.to_string());
            return false;
        }

        let Some(value) = self.evaluate_constant(init, constant.constant_type) else {
            self.failed_constants.insert(name.to_string());
            return false;
        };
        self.define_constant(name, value);
        true
    }

    fn define_constant(&mut self, name: &str, value: TypedValue) {
        debug!(constant = name, value = %value, "resolved constant");
        self.constants
            .insert(name.to_string(), IdentifierInfo::Constant(value));
        self.identifiers
            .insert(name.to_string(), IdentifierInfo::Constant(value));
    }

    /// Compile and run a constant expression. Only already-resolved
    /// constants are in scope, so anything state-dependent fails to
    /// compile rather than evaluate.
    fn evaluate_constant(&mut self, expr: &Expression, expected: Type) -> Option<TypedValue> {
        let no_formulas = HashMap::new();
        let no_substitutions = HashMap::new();
        let compiled = match compile_expression(
            expr,
            expected,
            &no_formulas,
            &self.constants,
            &no_substitutions,
        ) {
            Ok(compiled) => compiled,
            Err(errors) => {
                self.errors.extend(errors);
                return None;
            }
        };
        let mut evaluator = Evaluator::for_expression(&compiled);
        Some(match expected {
            Type::Int => TypedValue::Int(evaluator.evaluate_int(&compiled, &[])),
            Type::Double => TypedValue::Double(evaluator.evaluate_double(&compiled, &[])),
            Type::Bool => TypedValue::Bool(evaluator.evaluate_bool(&compiled, &[])),
        })
    }

    // -- variables ------------------------------------------------------

    fn compile_variables(&mut self) {
        let model = self.model;
        for (index, variable) in model.variables.iter().enumerate() {
            let compiled = match variable.variable_type {
                Type::Double => {
                    self.error(CompileError::Unsupported(
                        "double variables not supported".to_string(),
                    ));
                    continue;
                }
                Type::Bool => {
                    let init = match &variable.init {
                        None => 0,
                        Some(expr) => match self.evaluate_constant(expr, Type::Bool) {
                            Some(TypedValue::Bool(b)) => b as i64,
                            _ => continue,
                        },
                    };
                    CompiledVariable {
                        name: variable.name.clone(),
                        variable_type: Type::Bool,
                        index,
                        min: 0,
                        max: 1,
                        init,
                    }
                }
                Type::Int => {
                    let Some((min_expr, max_expr)) = &variable.range else {
                        self.error(CompileError::BadRange(variable.name.clone()));
                        continue;
                    };
                    let (Some(TypedValue::Int(min)), Some(TypedValue::Int(max))) = (
                        self.evaluate_constant(min_expr, Type::Int),
                        self.evaluate_constant(max_expr, Type::Int),
                    ) else {
                        continue;
                    };
                    if min >= max {
                        self.error(CompileError::BadRange(variable.name.clone()));
                        continue;
                    }
                    let init = match &variable.init {
                        None => min,
                        Some(expr) => match self.evaluate_constant(expr, Type::Int) {
                            Some(TypedValue::Int(n)) => n,
                            _ => continue,
                        },
                    };
                    if init < min || init > max {
                        self.error(CompileError::BadInit(variable.name.clone()));
                        continue;
                    }
                    CompiledVariable {
                        name: variable.name.clone(),
                        variable_type: Type::Int,
                        index,
                        min,
                        max,
                        init,
                    }
                }
            };
            self.identifiers.insert(
                compiled.name.clone(),
                IdentifierInfo::Variable {
                    variable_type: compiled.variable_type,
                    index: compiled.index,
                    min: compiled.min,
                    max: compiled.max,
                    init: compiled.init,
                },
            );
            self.variables.push(compiled);
        }
    }

    // -- commands -------------------------------------------------------

    fn compile_commands(
        &mut self,
    ) -> (
        Vec<CompiledMarkovCommand>,
        Vec<FactoredMarkovAction>,
        Vec<CompiledGsmpCommand>,
        Vec<FactoredGsmpAction>,
    ) {
        let mut single_markov = Vec::new();
        let mut single_gsmp = Vec::new();
        // Per action, in first-appearance order: per-module command lists.
        let mut actions: Vec<ActionGroup> = Vec::new();

        let model = self.model;
        for (module_index, module) in model.modules.iter().enumerate() {
            debug!(
                module = %module.name,
                commands = module.commands.len(),
                "compiling module"
            );
            for command in &module.commands {
                let compiled = self.compile_command(command, module_index);
                let Some(compiled) = compiled else { continue };
                match &command.action {
                    None => match compiled {
                        EitherCommand::Markov(c) => single_markov.push(c),
                        EitherCommand::Gsmp(c) => single_gsmp.push(c),
                    },
                    Some(action) => {
                        let group = match actions.iter_mut().find(|g| &g.action == action) {
                            Some(group) => group,
                            None => {
                                actions.push(ActionGroup {
                                    action: action.clone(),
                                    modules: Vec::new(),
                                });
                                actions.last_mut().unwrap()
                            }
                        };
                        let slot = match group
                            .modules
                            .iter_mut()
                            .find(|(m, _, _)| *m == module_index)
                        {
                            Some(slot) => slot,
                            None => {
                                group.modules.push((module_index, Vec::new(), Vec::new()));
                                group.modules.last_mut().unwrap()
                            }
                        };
                        match compiled {
                            EitherCommand::Markov(c) => slot.1.push(c),
                            EitherCommand::Gsmp(c) => slot.2.push(c),
                        }
                    }
                }
            }
        }

        let mut factored_markov = Vec::new();
        let mut factored_gsmp = Vec::new();
        for group in actions {
            self.partition_action(
                group,
                &mut single_markov,
                &mut single_gsmp,
                &mut factored_markov,
                &mut factored_gsmp,
            );
        }
        (single_markov, factored_markov, single_gsmp, factored_gsmp)
    }

    /// Turn one action group into its factored form. An action confined
    /// to a single module has nothing to synchronize with and degenerates
    /// to unsynchronized commands.
    fn partition_action(
        &mut self,
        group: ActionGroup,
        single_markov: &mut Vec<CompiledMarkovCommand>,
        single_gsmp: &mut Vec<CompiledGsmpCommand>,
        factored_markov: &mut Vec<FactoredMarkovAction>,
        factored_gsmp: &mut Vec<FactoredGsmpAction>,
    ) {
        if group.modules.len() == 1 {
            let (_, markov, gsmp) = group.modules.into_iter().next().unwrap();
            single_markov.extend(markov);
            single_gsmp.extend(gsmp);
            return;
        }

        let owners = group
            .modules
            .iter()
            .filter(|(_, _, gsmp)| !gsmp.is_empty())
            .count();
        if owners == 0 {
            factored_markov.push(FactoredMarkovAction {
                action: group.action,
                modules: group.modules.into_iter().map(|(_, m, _)| m).collect(),
            });
            return;
        }
        if owners > 1 {
            self.error(CompileError::Unsupported(format!(
                "action '{}' has general delays in more than one module",
                group.action
            )));
            return;
        }
        let mut gsmp_commands = Vec::new();
        let mut markov_commands = Vec::new();
        for (_, markov, gsmp) in group.modules {
            if gsmp.is_empty() {
                markov_commands.push(markov);
            } else {
                if !markov.is_empty() {
                    self.error(CompileError::Unsupported(format!(
                        "action '{}' mixes general and memoryless delays in one module",
                        group.action
                    )));
                    return;
                }
                gsmp_commands = gsmp;
            }
        }
        factored_gsmp.push(FactoredGsmpAction {
            action: group.action,
            gsmp_commands,
            markov_commands,
        });
    }

    fn compile_command(
        &mut self,
        command: &stocha_syntax::Command,
        module_index: usize,
    ) -> Option<EitherCommand> {
        let errors_before = self.errors.len();
        let guard = self.compile_bool(&command.guard);

        match &command.delay {
            Distribution::Memoryless { weight } => {
                let weight = self.compile_parameter(weight);
                let outcomes = command
                    .outcomes
                    .iter()
                    .map(|outcome| CompiledMarkovOutcome {
                        probability: self.compile_parameter(&outcome.probability),
                        updates: self.compile_updates(&outcome.updates),
                    })
                    .collect();
                (self.errors.len() == errors_before).then_some(EitherCommand::Markov(
                    CompiledMarkovCommand {
                        module: Some(module_index),
                        guard,
                        weight,
                        outcomes,
                    },
                ))
            }
            delay => {
                if self.model.model_type != ModelType::Gsmp {
                    self.error(CompileError::Unsupported(
                        "general delay distributions require a gsmp model".to_string(),
                    ));
                    return None;
                }
                if command.outcomes.len() != 1 {
                    self.error(CompileError::Unsupported(
                        "a command with a general delay must have exactly one outcome"
                            .to_string(),
                    ));
                    return None;
                }
                let delay = match delay {
                    Distribution::Weibull { scale, shape } => CompiledGsmpDistribution::Weibull {
                        scale: self.compile_parameter(scale),
                        shape: self.compile_parameter(shape),
                    },
                    Distribution::Lognormal { scale, shape } => {
                        CompiledGsmpDistribution::Lognormal {
                            scale: self.compile_parameter(scale),
                            shape: self.compile_parameter(shape),
                        }
                    }
                    Distribution::Uniform { low, high } => CompiledGsmpDistribution::Uniform {
                        low: self.compile_parameter(low),
                        high: self.compile_parameter(high),
                    },
                    Distribution::Memoryless { .. } => unreachable!(),
                };
                let updates = self.compile_updates(&command.outcomes[0].updates);
                (self.errors.len() == errors_before).then_some(EitherCommand::Gsmp(
                    CompiledGsmpCommand {
                        module: Some(module_index),
                        guard,
                        delay,
                        updates,
                        first_index: 0,
                    },
                ))
            }
        }
    }

    fn compile_bool(&mut self, expr: &Expression) -> CompiledExpression {
        let no_substitutions = HashMap::new();
        match compile_expression(
            expr,
            Type::Bool,
            &self.formulas,
            &self.identifiers,
            &no_substitutions,
        ) {
            Ok(compiled) => optimize_int_expression(&compiled),
            Err(errors) => {
                self.errors.extend(errors);
                CompiledExpression::default()
            }
        }
    }

    fn compile_parameter(&mut self, expr: &Expression) -> CompiledParameter {
        let no_substitutions = HashMap::new();
        match compile_expression(
            expr,
            Type::Double,
            &self.formulas,
            &self.identifiers,
            &no_substitutions,
        ) {
            Ok(compiled) => CompiledParameter::from_expression(optimize_double_expression(&compiled)),
            Err(errors) => {
                self.errors.extend(errors);
                CompiledParameter::Literal(0.0)
            }
        }
    }

    fn compile_updates(&mut self, updates: &[stocha_syntax::Update]) -> Vec<CompiledUpdate> {
        let no_substitutions = HashMap::new();
        let mut compiled = Vec::with_capacity(updates.len());
        for update in updates {
            let (index, variable_type) = match self.identifiers.get(&update.variable) {
                Some(IdentifierInfo::Variable {
                    index,
                    variable_type,
                    ..
                }) => (*index, *variable_type),
                Some(IdentifierInfo::Constant(_)) => {
                    self.error(CompileError::NotAVariable(update.variable.clone()));
                    continue;
                }
                None if self.formulas.contains_key(&update.variable) => {
                    self.error(CompileError::NotAVariable(update.variable.clone()));
                    continue;
                }
                None => {
                    self.error(CompileError::UndefinedIdentifier(update.variable.clone()));
                    continue;
                }
            };
            match compile_expression(
                &update.expr,
                variable_type,
                &self.formulas,
                &self.identifiers,
                &no_substitutions,
            ) {
                Ok(expr) => compiled.push(CompiledUpdate {
                    variable: index,
                    expr: optimize_int_expression(&expr),
                }),
                Err(errors) => self.errors.extend(errors),
            }
        }
        compiled
    }
}

enum EitherCommand {
    Markov(CompiledMarkovCommand),
    Gsmp(CompiledGsmpCommand),
}

struct ActionGroup {
    action: String,
    /// (module index, memoryless commands, general-delay commands).
    modules: Vec<(usize, Vec<CompiledMarkovCommand>, Vec<CompiledGsmpCommand>)>,
}

/// Assign each general-delay command its contiguous block of trigger-time
/// slots. A single command owns one slot; a factored command owns one
/// slot per combination of partner-module commands, addressed row-major
/// by the partner command indices.
fn assign_trigger_slots(model: &mut CompiledModel) {
    let mut next = 0;
    for command in &mut model.single_gsmp_commands {
        command.first_index = next;
        next += 1;
    }
    for action in &mut model.factored_gsmp_commands {
        let block: usize = action
            .markov_commands
            .iter()
            .map(|module| module.len())
            .product();
        for command in &mut action.gsmp_commands {
            command.first_index = next;
            next += block;
        }
    }
    model.gsmp_event_count = next;
}

fn markov_register_counts(command: &CompiledMarkovCommand) -> RegisterCounts {
    let mut counts = command.guard.register_counts().max(command.weight.register_counts());
    for outcome in &command.outcomes {
        counts = counts.max(outcome.probability.register_counts());
        for update in &outcome.updates {
            counts = counts.max(update.expr.register_counts());
        }
    }
    counts
}

fn gsmp_register_counts(command: &CompiledGsmpCommand) -> RegisterCounts {
    let mut counts = command.guard.register_counts();
    for param in command.delay.parameters() {
        counts = counts.max(param.register_counts());
    }
    for update in &command.updates {
        counts = counts.max(update.expr.register_counts());
    }
    counts
}

fn collect_register_counts(model: &CompiledModel) -> RegisterCounts {
    let mut counts = RegisterCounts::default();
    for command in &model.single_markov_commands {
        counts = counts.max(markov_register_counts(command));
    }
    for action in &model.factored_markov_commands {
        for command in action.modules.iter().flatten() {
            counts = counts.max(markov_register_counts(command));
        }
    }
    for command in &model.single_gsmp_commands {
        counts = counts.max(gsmp_register_counts(command));
    }
    for action in &model.factored_gsmp_commands {
        for command in &action.gsmp_commands {
            counts = counts.max(gsmp_register_counts(command));
        }
        for command in action.markov_commands.iter().flatten() {
            counts = counts.max(markov_register_counts(command));
        }
    }
    counts
}
