//! The register VM.

use crate::expression::{CompiledExpression, Operation, RegisterCounts};

/// Executes compiled expressions against a state vector.
///
/// Owns two flat register files, sized once to the model-wide maximum of
/// per-expression register counts. Safe to reuse across many calls but
/// not across threads: each concurrent trajectory needs its own instance.
#[derive(Debug)]
pub struct Evaluator {
    iregs: Vec<i64>,
    dregs: Vec<f64>,
}

impl Evaluator {
    pub fn new(counts: RegisterCounts) -> Evaluator {
        Evaluator {
            iregs: vec![0; counts.num_iregs],
            dregs: vec![0.0; counts.num_dregs],
        }
    }

    /// Convenience constructor sized for a single expression.
    pub fn for_expression(expr: &CompiledExpression) -> Evaluator {
        Evaluator::new(expr.register_counts())
    }

    /// Evaluate an int-valued (or bool-valued) expression. The result is
    /// whatever int register 0 holds when the program counter runs off
    /// the end.
    pub fn evaluate_int(&mut self, expr: &CompiledExpression, state: &[i64]) -> i64 {
        self.run(expr.operations(), state);
        self.iregs[0]
    }

    /// Evaluate a double-valued expression; the result is double
    /// register 0.
    pub fn evaluate_double(&mut self, expr: &CompiledExpression, state: &[i64]) -> f64 {
        self.run(expr.operations(), state);
        self.dregs[0]
    }

    /// Evaluate a bool-valued expression.
    pub fn evaluate_bool(&mut self, expr: &CompiledExpression, state: &[i64]) -> bool {
        self.evaluate_int(expr, state) != 0
    }

    // Dispatch is exhaustive over the closed operation set; a register
    // index beyond the files is a compiler bug and panics via indexing.
    fn run(&mut self, ops: &[Operation], state: &[i64]) {
        let iregs = &mut self.iregs;
        let dregs = &mut self.dregs;
        let mut pc = 0;
        while let Some(op) = ops.get(pc) {
            match *op {
                Operation::IConst { value, dst } => iregs[dst] = value,
                Operation::DConst { value, dst } => dregs[dst] = value,
                Operation::ILoad { variable, dst } => iregs[dst] = state[variable],
                Operation::I2D { register } => dregs[register] = iregs[register] as f64,
                Operation::INeg { register } => iregs[register] = -iregs[register],
                Operation::DNeg { register } => dregs[register] = -dregs[register],
                Operation::Not { register } => iregs[register] = (iregs[register] == 0) as i64,

                Operation::IAdd { dst, src } => iregs[dst] = iregs[dst].wrapping_add(iregs[src]),
                Operation::ISub { dst, src } => iregs[dst] = iregs[dst].wrapping_sub(iregs[src]),
                Operation::IMul { dst, src } => iregs[dst] = iregs[dst].wrapping_mul(iregs[src]),
                Operation::DAdd { dst, src } => dregs[dst] += dregs[src],
                Operation::DSub { dst, src } => dregs[dst] -= dregs[src],
                Operation::DMul { dst, src } => dregs[dst] *= dregs[src],
                Operation::DDiv { dst, src } => dregs[dst] /= dregs[src],

                Operation::IEq { dst, src } => iregs[dst] = (iregs[dst] == iregs[src]) as i64,
                Operation::INe { dst, src } => iregs[dst] = (iregs[dst] != iregs[src]) as i64,
                Operation::ILt { dst, src } => iregs[dst] = (iregs[dst] < iregs[src]) as i64,
                Operation::ILe { dst, src } => iregs[dst] = (iregs[dst] <= iregs[src]) as i64,
                Operation::IGe { dst, src } => iregs[dst] = (iregs[dst] >= iregs[src]) as i64,
                Operation::IGt { dst, src } => iregs[dst] = (iregs[dst] > iregs[src]) as i64,
                Operation::DEq { dst, src } => iregs[dst] = (dregs[dst] == dregs[src]) as i64,
                Operation::DNe { dst, src } => iregs[dst] = (dregs[dst] != dregs[src]) as i64,
                Operation::DLt { dst, src } => iregs[dst] = (dregs[dst] < dregs[src]) as i64,
                Operation::DLe { dst, src } => iregs[dst] = (dregs[dst] <= dregs[src]) as i64,
                Operation::DGe { dst, src } => iregs[dst] = (dregs[dst] >= dregs[src]) as i64,
                Operation::DGt { dst, src } => iregs[dst] = (dregs[dst] > dregs[src]) as i64,

                Operation::IfFalse { condition, target } => {
                    if iregs[condition] == 0 {
                        pc = target;
                        continue;
                    }
                }
                Operation::IfTrue { condition, target } => {
                    if iregs[condition] != 0 {
                        pc = target;
                        continue;
                    }
                }
                Operation::Goto { target } => {
                    pc = target;
                    continue;
                }
                Operation::Nop => {}

                Operation::IMin { dst, src } => iregs[dst] = iregs[dst].min(iregs[src]),
                Operation::IMax { dst, src } => iregs[dst] = iregs[dst].max(iregs[src]),
                Operation::DMin { dst, src } => dregs[dst] = dregs[dst].min(dregs[src]),
                Operation::DMax { dst, src } => dregs[dst] = dregs[dst].max(dregs[src]),

                Operation::Floor { register } => iregs[register] = dregs[register].floor() as i64,
                Operation::Ceil { register } => iregs[register] = dregs[register].ceil() as i64,
                Operation::Pow { dst, src } => dregs[dst] = dregs[dst].powf(dregs[src]),
                Operation::Log { dst, src } => dregs[dst] = dregs[dst].ln() / dregs[src].ln(),
                Operation::Mod { dst, src } => iregs[dst] %= iregs[src],

                Operation::IVeq {
                    variable,
                    value,
                    dst,
                } => iregs[dst] = (state[variable] == value) as i64,
            }
            pc += 1;
        }
    }
}
