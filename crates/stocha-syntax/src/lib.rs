//! AST types for stochastic models.
//!
//! The textual-grammar parser (an external collaborator) produces these
//! trees; the model compiler in `stocha-ir` consumes them read-only.

pub mod ast;
pub mod model;

pub use ast::{BinaryOperator, Expression, Function, Type, TypedValue, UnaryOperator};
pub use model::{
    Command, Constant, Distribution, Formula, Model, ModelType, Module, Outcome, Update, Variable,
};
