//! Peephole optimizer for compiled expressions.
//!
//! Transforms a compiled expression into an equivalent, smaller one:
//! constant folding, negation/NOT cancellation, variable-comparison
//! fusion (IVEQ), constant-branch resolution with jump threading, and
//! liveness-based dead-code elimination. All passes are
//! semantics-preserving and run to a fixpoint, so optimization is
//! idempotent.

use crate::expression::{CompiledExpression, Operation, Register};
use std::collections::{HashMap, HashSet};

/// Optimize an expression whose result is int register 0.
pub fn optimize_int_expression(expr: &CompiledExpression) -> CompiledExpression {
    optimize(expr.operations().to_vec(), Register::int(0))
}

/// Optimize an expression whose result is double register 0.
pub fn optimize_double_expression(expr: &CompiledExpression) -> CompiledExpression {
    optimize(expr.operations().to_vec(), Register::double(0))
}

impl CompiledExpression {
    /// Pin one state variable to a concrete value (every ILOAD of it
    /// becomes an ICONST, every IVEQ on it folds to 0/1) and
    /// re-optimize. Used when enumerating a variable's domain.
    pub fn with_assignment_int(&self, variable: usize, value: i64) -> CompiledExpression {
        optimize(
            substitute_variable(self.operations(), variable, value),
            Register::int(0),
        )
    }

    /// Like [`CompiledExpression::with_assignment_int`] for expressions
    /// whose result is double register 0.
    pub fn with_assignment_double(&self, variable: usize, value: i64) -> CompiledExpression {
        optimize(
            substitute_variable(self.operations(), variable, value),
            Register::double(0),
        )
    }
}

fn substitute_variable(ops: &[Operation], variable: usize, value: i64) -> Vec<Operation> {
    ops.iter()
        .map(|op| match *op {
            Operation::ILoad { variable: v, dst } if v == variable => {
                Operation::IConst { value, dst }
            }
            Operation::IVeq {
                variable: v,
                value: k,
                dst,
            } if v == variable => Operation::IConst {
                value: (value == k) as i64,
                dst,
            },
            op => op,
        })
        .collect()
}

fn optimize(mut ops: Vec<Operation>, result: Register) -> CompiledExpression {
    loop {
        let mut changed = false;
        changed |= fold_constants(&mut ops);
        changed |= cancel_unary_pairs(&mut ops);
        changed |= fuse_variable_comparisons(&mut ops);
        changed |= simplify_branches(&mut ops);
        changed |= eliminate_dead_code(&mut ops, result);
        if !changed {
            return CompiledExpression::new(ops);
        }
    }
}

/// A register whose current value is known at a program point.
#[derive(Clone, Copy, PartialEq)]
enum Known {
    Int(i64),
    Double(f64),
}

fn jump_target_set(ops: &[Operation]) -> HashSet<usize> {
    ops.iter().filter_map(|op| op.jump_target()).collect()
}

/// Remove the operation at `pos`, retargeting jumps that pointed past it.
/// A jump that pointed exactly at `pos` now lands on its successor.
fn remove_operation(ops: &mut Vec<Operation>, pos: usize) {
    ops.remove(pos);
    for op in ops.iter_mut() {
        if let Some(target) = op.jump_target_mut() {
            if *target > pos {
                *target -= 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Constant folding
// ---------------------------------------------------------------------------

/// Replace any operation whose source registers hold known constants
/// (the last write with no intervening jump target) by a single constant
/// carrying the folded value. The replaced sources become dead and are
/// cleaned up by the liveness pass.
fn fold_constants(ops: &mut [Operation]) -> bool {
    let targets = jump_target_set(ops);
    let mut known: HashMap<Register, Known> = HashMap::new();
    let mut changed = false;

    for pc in 0..ops.len() {
        if targets.contains(&pc) {
            known.clear();
        }
        if let Some(folded) = try_fold(&ops[pc], &known) {
            if folded != ops[pc] {
                ops[pc] = folded;
                changed = true;
            }
        }
        match ops[pc] {
            Operation::IConst { value, dst } => {
                known.insert(Register::int(dst), Known::Int(value));
            }
            Operation::DConst { value, dst } => {
                known.insert(Register::double(dst), Known::Double(value));
            }
            // Fallthrough past an unconditional jump is only reachable
            // as a jump target, where knowledge is cleared anyway.
            Operation::Goto { .. } => known.clear(),
            op => {
                if let Some(written) = op.writes() {
                    known.remove(&written);
                }
            }
        }
    }
    changed
}

fn try_fold(op: &Operation, known: &HashMap<Register, Known>) -> Option<Operation> {
    use Operation::*;

    let int_of = |index: usize| match known.get(&Register::int(index)) {
        Some(Known::Int(v)) => Some(*v),
        _ => None,
    };
    let double_of = |index: usize| match known.get(&Register::double(index)) {
        Some(Known::Double(v)) => Some(*v),
        _ => None,
    };
    let iconst = |value: i64, dst: usize| Some(IConst { value, dst });
    let dconst = |value: f64, dst: usize| Some(DConst { value, dst });

    match *op {
        I2D { register } => dconst(int_of(register)? as f64, register),
        INeg { register } => iconst(-int_of(register)?, register),
        DNeg { register } => dconst(-double_of(register)?, register),
        Not { register } => iconst((int_of(register)? == 0) as i64, register),

        IAdd { dst, src } => iconst(int_of(dst)?.wrapping_add(int_of(src)?), dst),
        ISub { dst, src } => iconst(int_of(dst)?.wrapping_sub(int_of(src)?), dst),
        IMul { dst, src } => iconst(int_of(dst)?.wrapping_mul(int_of(src)?), dst),
        IMin { dst, src } => iconst(int_of(dst)?.min(int_of(src)?), dst),
        IMax { dst, src } => iconst(int_of(dst)?.max(int_of(src)?), dst),
        Mod { dst, src } => {
            let divisor = int_of(src)?;
            // mod 0 faults at runtime; leave it there.
            if divisor == 0 {
                return None;
            }
            iconst(int_of(dst)? % divisor, dst)
        }

        DAdd { dst, src } => dconst(double_of(dst)? + double_of(src)?, dst),
        DSub { dst, src } => dconst(double_of(dst)? - double_of(src)?, dst),
        DMul { dst, src } => dconst(double_of(dst)? * double_of(src)?, dst),
        DDiv { dst, src } => dconst(double_of(dst)? / double_of(src)?, dst),
        DMin { dst, src } => dconst(double_of(dst)?.min(double_of(src)?), dst),
        DMax { dst, src } => dconst(double_of(dst)?.max(double_of(src)?), dst),
        Pow { dst, src } => dconst(double_of(dst)?.powf(double_of(src)?), dst),
        Log { dst, src } => dconst(double_of(dst)?.ln() / double_of(src)?.ln(), dst),

        IEq { dst, src } => iconst((int_of(dst)? == int_of(src)?) as i64, dst),
        INe { dst, src } => iconst((int_of(dst)? != int_of(src)?) as i64, dst),
        ILt { dst, src } => iconst((int_of(dst)? < int_of(src)?) as i64, dst),
        ILe { dst, src } => iconst((int_of(dst)? <= int_of(src)?) as i64, dst),
        IGe { dst, src } => iconst((int_of(dst)? >= int_of(src)?) as i64, dst),
        IGt { dst, src } => iconst((int_of(dst)? > int_of(src)?) as i64, dst),
        DEq { dst, src } => iconst((double_of(dst)? == double_of(src)?) as i64, dst),
        DNe { dst, src } => iconst((double_of(dst)? != double_of(src)?) as i64, dst),
        DLt { dst, src } => iconst((double_of(dst)? < double_of(src)?) as i64, dst),
        DLe { dst, src } => iconst((double_of(dst)? <= double_of(src)?) as i64, dst),
        DGe { dst, src } => iconst((double_of(dst)? >= double_of(src)?) as i64, dst),
        DGt { dst, src } => iconst((double_of(dst)? > double_of(src)?) as i64, dst),

        Floor { register } => iconst(double_of(register)?.floor() as i64, register),
        Ceil { register } => iconst(double_of(register)?.ceil() as i64, register),

        IConst { .. } | DConst { .. } | ILoad { .. } | IVeq { .. } | IfFalse { .. }
        | IfTrue { .. } | Goto { .. } | Nop => None,
    }
}

// ---------------------------------------------------------------------------
// Negation/NOT cancellation
// ---------------------------------------------------------------------------

fn is_cancelling_pair(a: Operation, b: Operation) -> bool {
    use Operation::*;
    matches!(
        (a, b),
        (INeg { register: r1 }, INeg { register: r2 })
        | (DNeg { register: r1 }, DNeg { register: r2 })
        | (Not { register: r1 }, Not { register: r2 })
            if r1 == r2
    )
}

/// Two consecutive identical negations on the same register cancel; an
/// odd chain collapses to one by repeated pair removal.
fn cancel_unary_pairs(ops: &mut Vec<Operation>) -> bool {
    let mut changed = false;
    loop {
        let targets = jump_target_set(ops);
        let pair = (0..ops.len().saturating_sub(1)).find(|&pc| {
            !targets.contains(&(pc + 1)) && is_cancelling_pair(ops[pc], ops[pc + 1])
        });
        match pair {
            Some(pc) => {
                remove_operation(ops, pc + 1);
                remove_operation(ops, pc);
                changed = true;
            }
            None => return changed,
        }
    }
}

// ---------------------------------------------------------------------------
// Variable-comparison fusion
// ---------------------------------------------------------------------------

/// `ILOAD v; ICONST k; IEQ` with a dead intermediate register fuses into
/// one IVEQ, which folds to a constant once the variable is pinned via
/// `with_assignment`.
fn fuse_variable_comparisons(ops: &mut Vec<Operation>) -> bool {
    let mut changed = false;
    loop {
        let targets = jump_target_set(ops);
        let mut fused = false;
        for pc in 0..ops.len().saturating_sub(2) {
            if targets.contains(&(pc + 1)) || targets.contains(&(pc + 2)) {
                continue;
            }
            let (Operation::ILoad { variable, dst }, Operation::IConst { value, dst: scratch }) =
                (ops[pc], ops[pc + 1])
            else {
                continue;
            };
            let Operation::IEq { dst: cmp_dst, src } = ops[pc + 2] else {
                continue;
            };
            if cmp_dst != dst || src != scratch || scratch == dst {
                continue;
            }
            // The compiler only emits forward jumps, so a linear
            // read-before-write scan decides whether the scratch
            // register is still consumed.
            if !int_register_dead_after(ops, pc + 3, scratch) {
                continue;
            }
            ops[pc] = Operation::IVeq {
                variable,
                value,
                dst,
            };
            remove_operation(ops, pc + 2);
            remove_operation(ops, pc + 1);
            changed = true;
            fused = true;
            break;
        }
        if !fused {
            return changed;
        }
    }
}

fn int_register_dead_after(ops: &[Operation], from: usize, index: usize) -> bool {
    let register = Register::int(index);
    for op in &ops[from.min(ops.len())..] {
        if op.reads().into_iter().flatten().any(|r| r == register) {
            return false;
        }
        if op.writes() == Some(register) {
            return true;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Constant branches and jump threading
// ---------------------------------------------------------------------------

enum Rewrite {
    Replace(usize, Operation),
    Remove(usize),
}

/// Resolve branches whose condition register is a known constant, drop
/// branches and gotos to the next instruction, and drop NOPs.
fn simplify_branches(ops: &mut Vec<Operation>) -> bool {
    let mut changed = false;
    loop {
        let rewrite = find_branch_rewrite(ops);
        match rewrite {
            Some(Rewrite::Replace(pc, op)) => {
                ops[pc] = op;
                changed = true;
            }
            Some(Rewrite::Remove(pc)) => {
                remove_operation(ops, pc);
                changed = true;
            }
            None => return changed,
        }
    }
}

fn find_branch_rewrite(ops: &[Operation]) -> Option<Rewrite> {
    let targets = jump_target_set(ops);
    let mut known: HashMap<Register, Known> = HashMap::new();

    for pc in 0..ops.len() {
        if targets.contains(&pc) {
            known.clear();
        }
        match ops[pc] {
            Operation::IfFalse { condition, target } | Operation::IfTrue { condition, target } => {
                // Both paths meet at the next instruction: pure fall-through.
                if target == pc + 1 {
                    return Some(Rewrite::Remove(pc));
                }
                if let Some(Known::Int(value)) = known.get(&Register::int(condition)) {
                    let jumps = match ops[pc] {
                        Operation::IfFalse { .. } => *value == 0,
                        _ => *value != 0,
                    };
                    return Some(if jumps {
                        Rewrite::Replace(pc, Operation::Goto { target })
                    } else {
                        Rewrite::Remove(pc)
                    });
                }
            }
            Operation::Goto { target } => {
                if target == pc + 1 {
                    return Some(Rewrite::Remove(pc));
                }
                known.clear();
            }
            Operation::Nop => return Some(Rewrite::Remove(pc)),
            Operation::IConst { value, dst } => {
                known.insert(Register::int(dst), Known::Int(value));
            }
            Operation::DConst { value, dst } => {
                known.insert(Register::double(dst), Known::Double(value));
            }
            op => {
                if let Some(written) = op.writes() {
                    known.remove(&written);
                }
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Dead-code elimination
// ---------------------------------------------------------------------------

fn successors(op: &Operation, pc: usize, len: usize) -> [Option<usize>; 2] {
    match *op {
        Operation::Goto { target } => [Some(target.min(len)), None],
        Operation::IfFalse { target, .. } | Operation::IfTrue { target, .. } => {
            [Some(pc + 1), Some(target.min(len))]
        }
        _ => [Some(pc + 1), None],
    }
}

/// Remove unreachable operations and pure operations whose destination
/// register is dead. Liveness is an iterative backward fixpoint over the
/// expression's control-flow graph, so a write is only dead when it is
/// dead along every path, including across jump targets.
fn eliminate_dead_code(ops: &mut Vec<Operation>, result: Register) -> bool {
    let n = ops.len();
    if n == 0 {
        return false;
    }

    // Reachability from entry.
    let mut reachable = vec![false; n + 1];
    let mut stack = vec![0usize];
    while let Some(pc) = stack.pop() {
        if reachable[pc] {
            continue;
        }
        reachable[pc] = true;
        if pc < n {
            for succ in successors(&ops[pc], pc, n).into_iter().flatten() {
                stack.push(succ);
            }
        }
    }

    // Backward liveness to a fixpoint. live_in[n] is the exit point,
    // where only the result register matters.
    let mut live_in: Vec<HashSet<Register>> = vec![HashSet::new(); n + 1];
    live_in[n].insert(result);
    loop {
        let mut stable = true;
        for pc in (0..n).rev() {
            let mut live: HashSet<Register> = HashSet::new();
            for succ in successors(&ops[pc], pc, n).into_iter().flatten() {
                live.extend(live_in[succ].iter().copied());
            }
            if let Some(written) = ops[pc].writes() {
                live.remove(&written);
            }
            for read in ops[pc].reads().into_iter().flatten() {
                live.insert(read);
            }
            if live != live_in[pc] {
                live_in[pc] = live;
                stable = false;
            }
        }
        if stable {
            break;
        }
    }

    let mut dead: Vec<usize> = Vec::new();
    for pc in 0..n {
        if !reachable[pc] {
            dead.push(pc);
            continue;
        }
        if ops[pc].jump_target().is_some() {
            continue;
        }
        if let Some(written) = ops[pc].writes() {
            let live_out = successors(&ops[pc], pc, n)
                .into_iter()
                .flatten()
                .any(|succ| live_in[succ].contains(&written));
            if !live_out {
                dead.push(pc);
            }
        }
    }
    for &pc in dead.iter().rev() {
        remove_operation(ops, pc);
    }
    !dead.is_empty()
}
