//! Compilers from the model AST to the executable representation.
//!
//! [`compile_expression`] type-checks and translates one expression tree
//! into register code; [`CompiledModel::make`] drives it over a whole
//! model, resolving constants, validating variables, and partitioning
//! commands for the simulator.

pub mod compile;
pub mod error;
pub mod model;

pub use compile::{compile_expression, IdentifierInfo};
pub use error::CompileError;
pub use model::{
    CompiledGsmpCommand, CompiledGsmpDistribution, CompiledMarkovCommand, CompiledMarkovOutcome,
    CompiledModel, CompiledParameter, CompiledUpdate, CompiledVariable, DistributionType,
    FactoredGsmpAction, FactoredMarkovAction,
};
