//! Competing-event selection: advances a trajectory by one step.

use stocha_eval::Evaluator;
use stocha_ir::{
    CompiledGsmpCommand, CompiledGsmpDistribution, CompiledMarkovCommand, CompiledMarkovOutcome,
    CompiledModel, CompiledUpdate,
};
use stocha_syntax::ModelType;
use tracing::trace;

use crate::random::{exponential, lognormal, standard_uniform, uniform, weibull, RandomSource};
use crate::state::State;

/// Samples the successor of a state under the model's semantics.
///
/// Owns the scratch evaluator for one trajectory; not shareable across
/// trajectories without external synchronization.
pub struct NextStateSampler<'m> {
    model: &'m CompiledModel,
    evaluator: Evaluator,
}

/// The event that won the current step.
enum Winner<'m> {
    /// One memoryless command per participating module.
    Markov(Vec<&'m CompiledMarkovCommand>),
    /// A general-delay command, its trigger-time slot, and the partner
    /// commands it synchronizes with.
    Gsmp {
        command: &'m CompiledGsmpCommand,
        slot: usize,
        partners: Vec<&'m CompiledMarkovCommand>,
    },
}

/// Running minimum over candidate firing times with exact uniform
/// tie-breaking: the i-th candidate tied at the minimum replaces the
/// current winner with probability 1/i.
struct Race<'m> {
    time: f64,
    ties: usize,
    winner: Option<Winner<'m>>,
}

impl<'m> Race<'m> {
    fn new() -> Race<'m> {
        Race {
            time: f64::INFINITY,
            ties: 0,
            winner: None,
        }
    }

    fn consider<R: RandomSource>(
        &mut self,
        time: f64,
        rng: &mut R,
        winner: impl FnOnce() -> Winner<'m>,
    ) {
        // A candidate that never fires cannot win.
        if !time.is_finite() {
            return;
        }
        if time < self.time {
            self.time = time;
            self.ties = 1;
            self.winner = Some(winner());
        } else if time == self.time {
            self.ties += 1;
            if standard_uniform(rng) * (self.ties as f64) < 1.0 {
                self.winner = Some(winner());
            }
        }
    }
}

impl<'m> NextStateSampler<'m> {
    pub fn new(model: &'m CompiledModel) -> NextStateSampler<'m> {
        NextStateSampler {
            model,
            evaluator: Evaluator::new(model.register_counts()),
        }
    }

    /// Advance `state` by one event, writing the successor into `next`.
    ///
    /// A step with no enabled command yields `time = +inf` with the
    /// variable values unchanged; this is a valid absorbing state, not
    /// an error.
    pub fn next_state<R: RandomSource>(&mut self, state: &State, next: &mut State, rng: &mut R) {
        next.values.clone_from(&state.values);
        next.trigger_times.clone_from(&state.trigger_times);
        match self.model.model_type {
            ModelType::Dtmc => self.next_state_uniform(state, next, rng),
            ModelType::Ctmc | ModelType::Gsmp => self.next_state_timed(state, next, rng),
        }
        trace!(time = next.time, "sampled step");
    }

    /// DTMC step: reservoir-sample uniformly among all enabled commands.
    fn next_state_uniform<R: RandomSource>(
        &mut self,
        state: &State,
        next: &mut State,
        rng: &mut R,
    ) {
        let model = self.model;
        let mut count = 0usize;
        let mut winner: Vec<&CompiledMarkovCommand> = Vec::new();

        for command in &model.single_markov_commands {
            if !self.evaluator.evaluate_bool(&command.guard, &state.values) {
                continue;
            }
            count += 1;
            if reservoir_accept(count, rng) {
                winner.clear();
                winner.push(command);
            }
        }
        for action in &model.factored_markov_commands {
            let enabled = self.enabled_modules(&action.modules, state);
            for_each_combination(&enabled, |combo| {
                count += 1;
                if reservoir_accept(count, rng) {
                    winner.clear();
                    winner.extend_from_slice(combo);
                }
            });
        }

        if count == 0 {
            next.time = f64::INFINITY;
            return;
        }
        next.time = state.time + 1.0;
        for command in winner {
            let outcome = self.choose_outcome(command, state, rng);
            self.apply_updates(&outcome.updates, state, next);
        }
    }

    /// CTMC/GSMP step: race the exponential clocks of memoryless
    /// commands against the cached trigger times of general-delay
    /// commands; the earliest firing wins, ties broken uniformly.
    fn next_state_timed<R: RandomSource>(&mut self, state: &State, next: &mut State, rng: &mut R) {
        let model = self.model;
        let mut race = Race::new();

        for command in &model.single_markov_commands {
            if !self.evaluator.evaluate_bool(&command.guard, &state.values) {
                continue;
            }
            let rate = command.weight.value(&mut self.evaluator, &state.values);
            let time = state.time + exponential(rng, rate);
            race.consider(time, rng, || Winner::Markov(vec![command]));
        }
        for action in &model.factored_markov_commands {
            let enabled = self.enabled_modules(&action.modules, state);
            let evaluator = &mut self.evaluator;
            for_each_combination(&enabled, |combo| {
                let rate: f64 = combo
                    .iter()
                    .map(|command| command.weight.value(evaluator, &state.values))
                    .product();
                let time = state.time + exponential(rng, rate);
                race.consider(time, rng, || Winner::Markov(combo.to_vec()));
            });
        }

        for command in &model.single_gsmp_commands {
            if !self.evaluator.evaluate_bool(&command.guard, &state.values) {
                continue;
            }
            let time = self.trigger_time(command, command.first_index, state, next, rng);
            race.consider(time, rng, || Winner::Gsmp {
                command,
                slot: command.first_index,
                partners: Vec::new(),
            });
        }
        for action in &model.factored_gsmp_commands {
            // Partner commands keep their original in-module index: the
            // trigger-time slot is addressed by those indices, so a
            // combination occupies the same slot whichever other
            // commands happen to be enabled.
            let partners: Vec<Vec<(usize, &CompiledMarkovCommand)>> = action
                .markov_commands
                .iter()
                .map(|module| {
                    module
                        .iter()
                        .enumerate()
                        .filter(|(_, command)| {
                            self.evaluator.evaluate_bool(&command.guard, &state.values)
                        })
                        .collect()
                })
                .collect();
            if partners.iter().any(|module| module.is_empty()) {
                continue;
            }
            for command in &action.gsmp_commands {
                if !self.evaluator.evaluate_bool(&command.guard, &state.values) {
                    continue;
                }
                let mut pending: Vec<(usize, Vec<&CompiledMarkovCommand>)> = Vec::new();
                for_each_combination(&partners, |combo| {
                    let mut offset = 0;
                    for ((index, _), module) in combo.iter().zip(&action.markov_commands) {
                        offset = offset * module.len() + *index;
                    }
                    pending.push((
                        command.first_index + offset,
                        combo.iter().map(|(_, partner)| *partner).collect(),
                    ));
                });
                for (slot, partner_commands) in pending {
                    let time = self.trigger_time(command, slot, state, next, rng);
                    race.consider(time, rng, || Winner::Gsmp {
                        command,
                        slot,
                        partners: partner_commands,
                    });
                }
            }
        }

        next.time = race.time;
        match race.winner {
            None => {}
            Some(Winner::Markov(commands)) => {
                for command in commands {
                    let outcome = self.choose_outcome(command, state, rng);
                    self.apply_updates(&outcome.updates, state, next);
                }
            }
            Some(Winner::Gsmp {
                command,
                slot,
                partners,
            }) => {
                self.apply_updates(&command.updates, state, next);
                for partner in partners {
                    let outcome = self.choose_outcome(partner, state, rng);
                    self.apply_updates(&outcome.updates, state, next);
                }
                // Fired: the next time this event is enabled it draws a
                // fresh sample.
                next.trigger_times[slot] = f64::INFINITY;
            }
        }
    }

    /// The absolute firing time of a general-delay candidate. A slot
    /// holding +inf has not been sampled yet: sample now, in the current
    /// state, and cache the result in the successor. A finite slot is a
    /// pending sample and is carried forward bit-for-bit.
    fn trigger_time<R: RandomSource>(
        &mut self,
        command: &CompiledGsmpCommand,
        slot: usize,
        state: &State,
        next: &mut State,
        rng: &mut R,
    ) -> f64 {
        let cached = state.trigger_times[slot];
        if cached.is_finite() {
            return cached;
        }
        let time = state.time + self.sample_delay(&command.delay, state, rng);
        next.trigger_times[slot] = time;
        time
    }

    fn sample_delay<R: RandomSource>(
        &mut self,
        delay: &CompiledGsmpDistribution,
        state: &State,
        rng: &mut R,
    ) -> f64 {
        let evaluator = &mut self.evaluator;
        match delay {
            CompiledGsmpDistribution::Weibull { scale, shape } => {
                let scale = scale.value(evaluator, &state.values);
                let shape = shape.value(evaluator, &state.values);
                weibull(rng, scale, shape)
            }
            CompiledGsmpDistribution::Lognormal { scale, shape } => {
                let scale = scale.value(evaluator, &state.values);
                let shape = shape.value(evaluator, &state.values);
                lognormal(rng, scale, shape)
            }
            CompiledGsmpDistribution::Uniform { low, high } => {
                let low = low.value(evaluator, &state.values);
                let high = high.value(evaluator, &state.values);
                uniform(rng, low, high)
            }
        }
    }

    fn enabled_modules<'a>(
        &mut self,
        modules: &'a [Vec<CompiledMarkovCommand>],
        state: &State,
    ) -> Vec<Vec<&'a CompiledMarkovCommand>> {
        modules
            .iter()
            .map(|module| {
                module
                    .iter()
                    .filter(|command| {
                        self.evaluator.evaluate_bool(&command.guard, &state.values)
                    })
                    .collect()
            })
            .collect()
    }

    /// Pick one outcome of a chosen command by inverting a uniform draw
    /// against the cumulative weights. The last outcome is the fallback,
    /// guarding against the running sum falling short of the draw by
    /// rounding.
    fn choose_outcome<'a, R: RandomSource>(
        &mut self,
        command: &'a CompiledMarkovCommand,
        state: &State,
        rng: &mut R,
    ) -> &'a CompiledMarkovOutcome {
        if command.outcomes.len() == 1 {
            return &command.outcomes[0];
        }
        let weights: Vec<f64> = command
            .outcomes
            .iter()
            .map(|outcome| outcome.probability.value(&mut self.evaluator, &state.values))
            .collect();
        let total: f64 = weights.iter().sum();
        let threshold = standard_uniform(rng) * total;
        let mut cumulative = 0.0;
        for (outcome, weight) in command.outcomes.iter().zip(&weights) {
            cumulative += weight;
            if cumulative > threshold {
                return outcome;
            }
        }
        command.outcomes.last().unwrap()
    }

    /// All update expressions read the predecessor state; writes land in
    /// the successor only.
    fn apply_updates(&mut self, updates: &[CompiledUpdate], state: &State, next: &mut State) {
        for update in updates {
            next.values[update.variable] = self.evaluator.evaluate_int(&update.expr, &state.values);
        }
    }
}

/// Accept the i-th candidate seen so far with probability 1/i; the first
/// candidate is accepted without consuming randomness.
fn reservoir_accept<R: RandomSource>(count: usize, rng: &mut R) -> bool {
    count == 1 || standard_uniform(rng) * (count as f64) < 1.0
}

/// Visit the Cartesian product of the given lists in row-major order
/// (last list varies fastest). No combinations exist if any list is
/// empty.
fn for_each_combination<T: Copy, F: FnMut(&[T])>(lists: &[Vec<T>], mut f: F) {
    if lists.is_empty() || lists.iter().any(|list| list.is_empty()) {
        return;
    }
    let mut indices = vec![0usize; lists.len()];
    let mut combo = Vec::with_capacity(lists.len());
    loop {
        combo.clear();
        combo.extend(indices.iter().zip(lists).map(|(&i, list)| list[i]));
        f(&combo);
        let mut position = lists.len();
        loop {
            if position == 0 {
                return;
            }
            position -= 1;
            indices[position] += 1;
            if indices[position] < lists[position].len() {
                break;
            }
            indices[position] = 0;
        }
    }
}
