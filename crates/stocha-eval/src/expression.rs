//! Compiled expressions: flat sequences of register operations.

use std::fmt;

/// The kind of a scratch register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    Int,
    Double,
}

/// A scratch register reference: kind plus index into that kind's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub kind: RegisterKind,
    pub index: usize,
}

impl Register {
    pub fn int(index: usize) -> Register {
        Register {
            kind: RegisterKind::Int,
            index,
        }
    }

    pub fn double(index: usize) -> Register {
        Register {
            kind: RegisterKind::Double,
            index,
        }
    }
}

/// A single VM operation. Immutable once constructed.
///
/// Two-address convention: binary operations read `dst` and `src` and
/// leave the result in `dst`. Comparisons over doubles read the double
/// file but write their 0/1 result into the int file at the same index.
/// Booleans live in int registers as 0/1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    /// `iregs[dst] <- value`
    IConst { value: i64, dst: usize },
    /// `dregs[dst] <- value`
    DConst { value: f64, dst: usize },
    /// `iregs[dst] <- state[variable]`
    ILoad { variable: usize, dst: usize },
    /// `dregs[register] <- iregs[register] as double`
    I2D { register: usize },
    /// `iregs[register] <- -iregs[register]`
    INeg { register: usize },
    /// `dregs[register] <- -dregs[register]`
    DNeg { register: usize },
    /// Boolean negation: `iregs[register] <- 1 - iregs[register]`
    Not { register: usize },

    IAdd { dst: usize, src: usize },
    ISub { dst: usize, src: usize },
    IMul { dst: usize, src: usize },
    DAdd { dst: usize, src: usize },
    DSub { dst: usize, src: usize },
    DMul { dst: usize, src: usize },
    DDiv { dst: usize, src: usize },

    IEq { dst: usize, src: usize },
    INe { dst: usize, src: usize },
    ILt { dst: usize, src: usize },
    ILe { dst: usize, src: usize },
    IGe { dst: usize, src: usize },
    IGt { dst: usize, src: usize },
    DEq { dst: usize, src: usize },
    DNe { dst: usize, src: usize },
    DLt { dst: usize, src: usize },
    DLe { dst: usize, src: usize },
    DGe { dst: usize, src: usize },
    DGt { dst: usize, src: usize },

    /// Jump to `target` when `iregs[condition]` is 0.
    IfFalse { condition: usize, target: usize },
    /// Jump to `target` when `iregs[condition]` is nonzero.
    IfTrue { condition: usize, target: usize },
    /// Unconditional jump.
    Goto { target: usize },
    Nop,

    IMin { dst: usize, src: usize },
    IMax { dst: usize, src: usize },
    DMin { dst: usize, src: usize },
    DMax { dst: usize, src: usize },

    /// `iregs[register] <- floor(dregs[register])`
    Floor { register: usize },
    /// `iregs[register] <- ceil(dregs[register])`
    Ceil { register: usize },
    /// `dregs[dst] <- dregs[dst] ^ dregs[src]`
    Pow { dst: usize, src: usize },
    /// `dregs[dst] <- log(dregs[dst]) / log(dregs[src])`
    Log { dst: usize, src: usize },
    /// `iregs[dst] <- iregs[dst] mod iregs[src]`
    Mod { dst: usize, src: usize },

    /// Fused variable/constant comparison produced by the optimizer:
    /// `iregs[dst] <- (state[variable] == value)`.
    IVeq {
        variable: usize,
        value: i64,
        dst: usize,
    },
}

impl Operation {
    /// The registers this operation reads, at most two.
    pub fn reads(&self) -> [Option<Register>; 2] {
        use Operation::*;
        match *self {
            IConst { .. } | DConst { .. } | ILoad { .. } | IVeq { .. } | Goto { .. } | Nop => {
                [None, None]
            }
            I2D { register } | INeg { register } | Not { register } => {
                [Some(Register::int(register)), None]
            }
            DNeg { register } | Floor { register } | Ceil { register } => {
                [Some(Register::double(register)), None]
            }
            IAdd { dst, src }
            | ISub { dst, src }
            | IMul { dst, src }
            | IEq { dst, src }
            | INe { dst, src }
            | ILt { dst, src }
            | ILe { dst, src }
            | IGe { dst, src }
            | IGt { dst, src }
            | IMin { dst, src }
            | IMax { dst, src }
            | Mod { dst, src } => [Some(Register::int(dst)), Some(Register::int(src))],
            DAdd { dst, src }
            | DSub { dst, src }
            | DMul { dst, src }
            | DDiv { dst, src }
            | DEq { dst, src }
            | DNe { dst, src }
            | DLt { dst, src }
            | DLe { dst, src }
            | DGe { dst, src }
            | DGt { dst, src }
            | DMin { dst, src }
            | DMax { dst, src }
            | Pow { dst, src }
            | Log { dst, src } => [Some(Register::double(dst)), Some(Register::double(src))],
            IfFalse { condition, .. } | IfTrue { condition, .. } => {
                [Some(Register::int(condition)), None]
            }
        }
    }

    /// The register this operation writes, if any.
    pub fn writes(&self) -> Option<Register> {
        use Operation::*;
        match *self {
            IConst { dst, .. } | ILoad { dst, .. } | IVeq { dst, .. } => Some(Register::int(dst)),
            DConst { dst, .. } => Some(Register::double(dst)),
            I2D { register } => Some(Register::double(register)),
            INeg { register } | Not { register } => Some(Register::int(register)),
            DNeg { register } => Some(Register::double(register)),
            Floor { register } | Ceil { register } => Some(Register::int(register)),
            IAdd { dst, .. }
            | ISub { dst, .. }
            | IMul { dst, .. }
            | IMin { dst, .. }
            | IMax { dst, .. }
            | Mod { dst, .. } => Some(Register::int(dst)),
            DAdd { dst, .. }
            | DSub { dst, .. }
            | DMul { dst, .. }
            | DDiv { dst, .. }
            | DMin { dst, .. }
            | DMax { dst, .. }
            | Pow { dst, .. }
            | Log { dst, .. } => Some(Register::double(dst)),
            IEq { dst, .. }
            | INe { dst, .. }
            | ILt { dst, .. }
            | ILe { dst, .. }
            | IGe { dst, .. }
            | IGt { dst, .. } => Some(Register::int(dst)),
            DEq { dst, .. }
            | DNe { dst, .. }
            | DLt { dst, .. }
            | DLe { dst, .. }
            | DGe { dst, .. }
            | DGt { dst, .. } => Some(Register::int(dst)),
            IfFalse { .. } | IfTrue { .. } | Goto { .. } | Nop => None,
        }
    }

    /// The jump target, if this is a control operation.
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Operation::IfFalse { target, .. }
            | Operation::IfTrue { target, .. }
            | Operation::Goto { target } => Some(*target),
            _ => None,
        }
    }

    /// Mutable access to the jump target, if any.
    pub fn jump_target_mut(&mut self) -> Option<&mut usize> {
        match self {
            Operation::IfFalse { target, .. }
            | Operation::IfTrue { target, .. }
            | Operation::Goto { target } => Some(target),
            _ => None,
        }
    }
}

/// Register-file sizes required to evaluate an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterCounts {
    pub num_iregs: usize,
    pub num_dregs: usize,
}

impl RegisterCounts {
    /// Component-wise maximum, for sizing one evaluator across many
    /// expressions.
    pub fn max(self, other: RegisterCounts) -> RegisterCounts {
        RegisterCounts {
            num_iregs: self.num_iregs.max(other.num_iregs),
            num_dregs: self.num_dregs.max(other.num_dregs),
        }
    }

    fn include(&mut self, register: Register) {
        let slot = match register.kind {
            RegisterKind::Int => &mut self.num_iregs,
            RegisterKind::Double => &mut self.num_dregs,
        };
        *slot = (*slot).max(register.index + 1);
    }
}

/// An ordered sequence of operations: a self-contained micro-program.
///
/// Invariants: every referenced register index is below the counts
/// reported by [`CompiledExpression::register_counts`], and every jump
/// target is an index into (or one past the end of) the sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledExpression {
    operations: Vec<Operation>,
}

impl CompiledExpression {
    pub fn new(operations: Vec<Operation>) -> CompiledExpression {
        debug_assert!(
            operations
                .iter()
                .filter_map(|op| op.jump_target())
                .all(|t| t <= operations.len()),
            "jump target outside expression"
        );
        CompiledExpression { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Register-file sizes large enough that no operation in this
    /// expression references a register at or beyond the returned bound.
    pub fn register_counts(&self) -> RegisterCounts {
        let mut counts = RegisterCounts::default();
        for op in &self.operations {
            for register in op.reads().into_iter().flatten() {
                counts.include(register);
            }
            if let Some(register) = op.writes() {
                counts.include(register);
            }
        }
        counts
    }

    /// If this expression is a single double constant, its value.
    pub fn as_double_constant(&self) -> Option<f64> {
        match self.operations.as_slice() {
            [Operation::DConst { value, dst: 0 }] => Some(*value),
            _ => None,
        }
    }

    /// If this expression is a single int constant, its value.
    pub fn as_int_constant(&self) -> Option<i64> {
        match self.operations.as_slice() {
            [Operation::IConst { value, dst: 0 }] => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, op) in self.operations.iter().enumerate() {
            writeln!(f, "{:3}: {:?}", pc, op)?;
        }
        Ok(())
    }
}
