//! Whole-trajectory tests driving the sampler over compiled models.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use stocha_ir::CompiledModel;
use stocha_sim::{EngineSource, NextStateSampler, RandomSource, State};
use stocha_syntax::{
    BinaryOperator as Bin, Command, Distribution, Expression, Model, ModelType, Module, Outcome,
    Type, Update, Variable,
};

/// Replays a fixed draw sequence over `[0, max]`; panics when asked for
/// more randomness than the test budgeted.
struct FakeSource {
    max: u64,
    draws: Vec<u64>,
    cursor: usize,
}

impl FakeSource {
    fn new(max: u64, draws: Vec<u64>) -> FakeSource {
        FakeSource {
            max,
            draws,
            cursor: 0,
        }
    }
}

impl RandomSource for FakeSource {
    fn min(&self) -> u64 {
        0
    }

    fn max(&self) -> u64 {
        self.max
    }

    fn next(&mut self) -> u64 {
        let draw = self.draws[self.cursor];
        self.cursor += 1;
        draw
    }
}

fn int_variable(name: &str, max: i64, init: i64) -> Variable {
    Variable {
        name: name.to_string(),
        variable_type: Type::Int,
        range: Some((Expression::literal_int(0), Expression::literal_int(max))),
        init: Some(Expression::literal_int(init)),
    }
}

fn guard_eq(variable: &str, value: i64) -> Expression {
    Expression::binary(
        Bin::Equal,
        Expression::identifier(variable),
        Expression::literal_int(value),
    )
}

fn set(variable: &str, value: i64) -> Update {
    Update {
        variable: variable.to_string(),
        expr: Expression::literal_int(value),
    }
}

fn single_outcome(updates: Vec<Update>) -> Vec<Outcome> {
    vec![Outcome {
        probability: Expression::literal_double(1.0),
        updates,
    }]
}

fn uniform_delay(low: f64, high: f64) -> Distribution {
    Distribution::Uniform {
        low: Expression::literal_double(low),
        high: Expression::literal_double(high),
    }
}

fn compile(model: &Model) -> CompiledModel {
    CompiledModel::make(model, &HashMap::new()).expect("test model failed to compile")
}

#[test]
fn dtmc_counter_trajectory_reaches_the_absorbing_state() {
    // One variable a in [0, 42] starting at 17; a==17 -> a:=18 and
    // a==18 -> a:=19. With a single enabled command per step no
    // randomness is consumed at all.
    let model = compile(&Model {
        variables: vec![int_variable("a", 42, 17)],
        modules: vec![Module {
            name: "counter".to_string(),
            commands: vec![
                Command {
                    action: None,
                    guard: guard_eq("a", 17),
                    delay: Distribution::Memoryless {
                        weight: Expression::literal_double(1.0),
                    },
                    outcomes: single_outcome(vec![set("a", 18)]),
                },
                Command {
                    action: None,
                    guard: guard_eq("a", 18),
                    delay: Distribution::Memoryless {
                        weight: Expression::literal_double(1.0),
                    },
                    outcomes: single_outcome(vec![set("a", 19)]),
                },
            ],
        }],
        ..Model::default()
    });

    let mut sampler = NextStateSampler::new(&model);
    let mut rng = FakeSource::new(4, vec![]);

    let state = State::initial(&model);
    assert_eq!(state.time, 0.0);
    assert_eq!(state.values, vec![17]);

    let mut first = state.clone();
    sampler.next_state(&state, &mut first, &mut rng);
    assert_eq!(first.time, 1.0);
    assert_eq!(first.values, vec![18]);

    let mut second = first.clone();
    sampler.next_state(&first, &mut second, &mut rng);
    assert_eq!(second.time, 2.0);
    assert_eq!(second.values, vec![19]);

    let mut third = second.clone();
    sampler.next_state(&second, &mut third, &mut rng);
    assert!(third.time.is_infinite());
    assert!(third.absorbing());
    assert_eq!(third.values, vec![19]);

    assert_eq!(rng.cursor, 0);
}

#[test]
fn gsmp_trigger_times_are_cached_bit_for_bit() {
    // Two general-delay commands race: the slow one (delay exactly 10)
    // loses the first step and must carry its sampled trigger time
    // forward unchanged until it fires.
    let model = compile(&Model {
        model_type: ModelType::Gsmp,
        variables: vec![int_variable("x", 4, 0)],
        modules: vec![Module {
            name: "m".to_string(),
            commands: vec![
                Command {
                    action: None,
                    guard: Expression::binary(
                        Bin::Less,
                        Expression::identifier("x"),
                        Expression::literal_int(2),
                    ),
                    delay: uniform_delay(10.0, 10.0),
                    outcomes: single_outcome(vec![set("x", 2)]),
                },
                Command {
                    action: None,
                    guard: guard_eq("x", 0),
                    delay: uniform_delay(5.0, 5.0),
                    outcomes: single_outcome(vec![set("x", 1)]),
                },
            ],
        }],
        ..Model::default()
    });
    assert_eq!(model.gsmp_event_count(), 2);

    let mut sampler = NextStateSampler::new(&model);
    // Each degenerate uniform sample still consumes one draw.
    let mut rng = FakeSource::new(4, vec![2, 2]);

    let state = State::initial(&model);
    assert_eq!(state.trigger_times, vec![f64::INFINITY, f64::INFINITY]);

    let mut first = state.clone();
    sampler.next_state(&state, &mut first, &mut rng);
    assert_eq!(first.time, 5.0);
    assert_eq!(first.values, vec![1]);
    // The loser's sample is cached; the winner's slot resets.
    assert_eq!(first.trigger_times[0].to_bits(), 10.0f64.to_bits());
    assert!(first.trigger_times[1].is_infinite());
    assert_eq!(rng.cursor, 2);

    let mut second = first.clone();
    sampler.next_state(&first, &mut second, &mut rng);
    // No resampling: the cached trigger time decides the step.
    assert_eq!(rng.cursor, 2);
    assert_eq!(second.time.to_bits(), 10.0f64.to_bits());
    assert_eq!(second.values, vec![2]);
    assert!(second.trigger_times[0].is_infinite());

    let mut third = second.clone();
    sampler.next_state(&second, &mut third, &mut rng);
    assert!(third.absorbing());
    assert_eq!(third.values, vec![2]);
}

#[test]
fn factored_gsmp_slots_follow_partner_indices() {
    // An owner module carries the delay; the partner module contributes
    // two memoryless commands, so the owner command anchors a block of
    // two trigger-time slots addressed by the partner's command index.
    let model = compile(&Model {
        model_type: ModelType::Gsmp,
        variables: vec![int_variable("x", 4, 0), int_variable("y", 4, 0)],
        modules: vec![
            Module {
                name: "owner".to_string(),
                commands: vec![Command {
                    action: Some("go".to_string()),
                    guard: guard_eq("x", 0),
                    delay: uniform_delay(3.0, 3.0),
                    outcomes: single_outcome(vec![set("x", 1)]),
                }],
            },
            Module {
                name: "partner".to_string(),
                commands: vec![
                    Command {
                        action: Some("go".to_string()),
                        guard: guard_eq("y", 0),
                        delay: Distribution::Memoryless {
                            weight: Expression::literal_double(1.0),
                        },
                        outcomes: single_outcome(vec![set("y", 1)]),
                    },
                    Command {
                        action: Some("go".to_string()),
                        guard: guard_eq("y", 0),
                        delay: Distribution::Memoryless {
                            weight: Expression::literal_double(1.0),
                        },
                        outcomes: single_outcome(vec![set("y", 2)]),
                    },
                ],
            },
        ],
        ..Model::default()
    });
    assert_eq!(model.gsmp_event_count(), 2);

    let mut sampler = NextStateSampler::new(&model);
    // Two composite candidates, each sampling its own slot (one draw
    // each, both exactly 3), then an exact tie broken by draw 1
    // (u = 0.2, 0.2 * 2 < 1): the second combination wins.
    let mut rng = FakeSource::new(4, vec![2, 2, 1]);

    let state = State::initial(&model);
    let mut next = state.clone();
    sampler.next_state(&state, &mut next, &mut rng);
    assert_eq!(rng.cursor, 3);
    assert_eq!(next.time, 3.0);
    assert_eq!(next.values, vec![1, 2]);
    // Slot 0 belongs to the losing combination and keeps its sample;
    // slot 1 fired and resets.
    assert_eq!(next.trigger_times[0].to_bits(), 3.0f64.to_bits());
    assert!(next.trigger_times[1].is_infinite());
}

#[test]
fn gsmp_races_memoryless_against_general_delays() {
    // A memoryless command and a general-delay command compete; the
    // exponential clock (rate 1, u = 0.2 so about 0.22) beats the
    // uniform delay of 5.
    let model = compile(&Model {
        model_type: ModelType::Gsmp,
        variables: vec![int_variable("x", 4, 0)],
        modules: vec![Module {
            name: "m".to_string(),
            commands: vec![
                Command {
                    action: None,
                    guard: guard_eq("x", 0),
                    delay: Distribution::Memoryless {
                        weight: Expression::literal_double(1.0),
                    },
                    outcomes: single_outcome(vec![set("x", 1)]),
                },
                Command {
                    action: None,
                    guard: guard_eq("x", 0),
                    delay: uniform_delay(5.0, 5.0),
                    outcomes: single_outcome(vec![set("x", 2)]),
                },
            ],
        }],
        ..Model::default()
    });

    let mut sampler = NextStateSampler::new(&model);
    let mut rng = FakeSource::new(4, vec![1, 2]);
    let state = State::initial(&model);
    let mut next = state.clone();
    sampler.next_state(&state, &mut next, &mut rng);
    assert_eq!(next.values, vec![1]);
    assert!(next.time < 1.0);
    // The general delay was sampled and cached even though it lost.
    assert_eq!(next.trigger_times[0].to_bits(), 5.0f64.to_bits());
}

#[test]
fn seeded_engine_exercises_both_branches() {
    let model = compile(&Model {
        variables: vec![int_variable("x", 4, 0)],
        modules: vec![Module {
            name: "m".to_string(),
            commands: vec![
                Command {
                    action: None,
                    guard: guard_eq("x", 0),
                    delay: Distribution::Memoryless {
                        weight: Expression::literal_double(1.0),
                    },
                    outcomes: single_outcome(vec![set("x", 1)]),
                },
                Command {
                    action: None,
                    guard: guard_eq("x", 0),
                    delay: Distribution::Memoryless {
                        weight: Expression::literal_double(1.0),
                    },
                    outcomes: single_outcome(vec![set("x", 2)]),
                },
            ],
        }],
        ..Model::default()
    });

    let mut sampler = NextStateSampler::new(&model);
    let mut rng = EngineSource::new(StdRng::seed_from_u64(42));
    let state = State::initial(&model);
    let mut counts = [0usize; 2];
    for _ in 0..200 {
        let mut next = state.clone();
        sampler.next_state(&state, &mut next, &mut rng);
        counts[(next.values[0] - 1) as usize] += 1;
    }
    // Uniform choice: with 200 trials both branches show up comfortably.
    assert!(counts[0] > 50 && counts[1] > 50, "counts: {:?}", counts);
}
