//! Compilation error types.
//!
//! Compile functions never throw: they accumulate errors into a list and
//! return a best-effort result, letting the caller decide whether to
//! abort.

use stocha_syntax::{Function, Type};
use thiserror::Error;

/// A compilation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("type mismatch; expected {expected}; found {found}")]
    TypeMismatch { expected: String, found: Type },

    #[error("undefined identifier '{0}'")]
    UndefinedIdentifier(String),

    #[error("duplicate identifier '{0}'")]
    DuplicateIdentifier(String),

    #[error("'{0}' is not a state variable")]
    NotAVariable(String),

    #[error("{function} applied to {found} arguments; expected {expected}")]
    ArityMismatch {
        function: Function,
        expected: String,
        found: usize,
    },

    #[error("incompatible branch types {if_type} and {else_type}")]
    IncompatibleBranchTypes { if_type: Type, else_type: Type },

    #[error("unsupported feature: {0}")]
    Unsupported(String),

    #[error("uninitialized constant '{0}'")]
    UninitializedConstant(String),

    #[error("cyclic evaluation for constant '{0}'")]
    CyclicConstant(String),

    #[error("cyclic evaluation for formula '{0}'")]
    CyclicFormula(String),

    #[error("bad range for variable '{0}'")]
    BadRange(String),

    #[error("bad initial value for variable '{0}'")]
    BadInit(String),

    #[error("unknown constant override '{0}'")]
    UnknownOverride(String),
}
