//! Discrete-event simulation over compiled stochastic models.
//!
//! One trajectory is driven by repeatedly calling
//! [`NextStateSampler::next_state`] on a [`State`]. Samplers, evaluators
//! and random sources are per-trajectory objects; run parallel
//! trajectories by giving each its own set.

pub mod random;
pub mod sampler;
pub mod state;

pub use random::{standard_uniform, EngineSource, RandomSource};
pub use sampler::NextStateSampler;
pub use state::State;
