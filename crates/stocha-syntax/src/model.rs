//! Model-level AST: constants, variables, formulas, modules and commands.

use crate::ast::{Expression, Type};

/// The kind of stochastic model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Discrete-time Markov chain: one uniform step per transition.
    Dtmc,
    /// Continuous-time Markov chain: exponential race between commands.
    Ctmc,
    /// Generalized semi-Markov process: general delay distributions.
    Gsmp,
}

/// `const int N = 4;` — a named constant, possibly overridden externally.
#[derive(Debug, Clone)]
pub struct Constant {
    pub name: String,
    pub constant_type: Type,
    /// Initializer; may reference other constants. None means the value
    /// must be supplied through an override.
    pub init: Option<Expression>,
}

/// `a : [0..42] init 17;` — a state variable declaration.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub variable_type: Type,
    /// Literal range bounds for int variables; None for bool.
    pub range: Option<(Expression, Expression)>,
    /// Initial value; defaults to the range minimum (false for bool).
    pub init: Option<Expression>,
}

/// `formula busy = q > 0;` — a named expression inlined at use sites.
#[derive(Debug, Clone)]
pub struct Formula {
    pub name: String,
    pub expr: Expression,
}

/// A single variable assignment within an outcome.
#[derive(Debug, Clone)]
pub struct Update {
    pub variable: String,
    pub expr: Expression,
}

/// The firing-time distribution of a command.
///
/// `Memoryless` is an instantaneous rate (exponential race for CTMC,
/// unit-step weight for DTMC); the other variants are GSMP delays.
#[derive(Debug, Clone)]
pub enum Distribution {
    Memoryless { weight: Expression },
    Weibull { scale: Expression, shape: Expression },
    Lognormal { scale: Expression, shape: Expression },
    Uniform { low: Expression, high: Expression },
}

/// One probabilistic branch of a command.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub probability: Expression,
    pub updates: Vec<Update>,
}

/// A guarded command.
#[derive(Debug, Clone)]
pub struct Command {
    /// Synchronization action label; None means unsynchronized.
    pub action: Option<String>,
    pub guard: Expression,
    pub delay: Distribution,
    pub outcomes: Vec<Outcome>,
}

/// A module: a named group of commands.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub commands: Vec<Command>,
}

/// A parsed model, as handed over by the grammar front end.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub model_type: ModelType,
    pub constants: Vec<Constant>,
    pub variables: Vec<Variable>,
    pub formulas: Vec<Formula>,
    pub modules: Vec<Module>,
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::Dtmc
    }
}
