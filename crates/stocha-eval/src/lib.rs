//! Register VM for compiled expressions.
//!
//! Expressions compile to flat sequences of register operations which an
//! [`Evaluator`] executes in a tight loop against a state vector,
//! eliminating the dispatch overhead of a tree-walk interpreter.

pub mod evaluator;
pub mod expression;
pub mod optimizer;

pub use evaluator::Evaluator;
pub use expression::{CompiledExpression, Operation, Register, RegisterCounts, RegisterKind};
pub use optimizer::{optimize_double_expression, optimize_int_expression};
