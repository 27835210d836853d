//! Trajectory state.

use stocha_ir::CompiledModel;

/// One point of a trajectory: the global clock, the variable values, and
/// the cached trigger times of pending general-delay events.
///
/// A trigger time of `+inf` means "not yet sampled"; any finite value is
/// a sample that must be carried forward unchanged until the event fires.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub time: f64,
    pub values: Vec<i64>,
    pub trigger_times: Vec<f64>,
}

impl State {
    /// The initial state of a trajectory: time zero, declared initial
    /// values, no trigger time sampled yet.
    pub fn initial(model: &CompiledModel) -> State {
        State {
            time: 0.0,
            values: model.init_values(),
            trigger_times: vec![f64::INFINITY; model.gsmp_event_count()],
        }
    }

    /// A deadlocked trajectory never leaves this state.
    pub fn absorbing(&self) -> bool {
        self.time.is_infinite()
    }
}
