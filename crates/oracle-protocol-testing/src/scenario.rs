//! A named, ordered list of calls into a `ConnectionStateMachine`, recorded
//! as data so a seed test from spec §8 reads as a trace rather than a
//! hand-rolled sequence of assertions buried in imperative code.

use oracle_protocol_core::{Action, ConnectionStateMachine};

/// One step of a [`Scenario`]: apply one call to the machine under test and
/// keep a human-readable label for it, so a failed match names the step.
pub struct ScenarioStep {
    /// What this step represents, shown in panic messages on mismatch.
    pub label: &'static str,
    #[allow(clippy::type_complexity)]
    apply: Box<dyn FnOnce(&mut ConnectionStateMachine) -> Action>,
}

impl ScenarioStep {
    /// Build a step from a label and the call it performs.
    pub fn new(label: &'static str, apply: impl FnOnce(&mut ConnectionStateMachine) -> Action + 'static) -> Self {
        Self {
            label,
            apply: Box::new(apply),
        }
    }
}

/// The outcome of running one [`ScenarioStep`]: its label alongside the
/// `Action` the machine actually returned.
pub struct StepOutcome {
    /// The step's label.
    pub label: &'static str,
    /// The action returned by this step.
    pub action: Action,
}

/// A named, ordered trace of calls against one `ConnectionStateMachine`.
///
/// Scenarios express the seed tests of spec §8 as data: build one, `run()`
/// it, then assert against the labeled `StepOutcome`s in order.
pub struct Scenario {
    /// The scenario's name, used only for diagnostics.
    pub name: &'static str,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Start a new, empty scenario.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name, steps: Vec::new() }
    }

    /// Append a step, returning `self` for chaining.
    #[must_use]
    pub fn step(mut self, label: &'static str, apply: impl FnOnce(&mut ConnectionStateMachine) -> Action + 'static) -> Self {
        self.steps.push(ScenarioStep::new(label, apply));
        self
    }

    /// Run every step in order against a fresh [`ConnectionStateMachine`],
    /// returning the machine (for any further inspection) and the ordered
    /// trace of outcomes.
    #[must_use]
    pub fn run(self) -> (ConnectionStateMachine, Vec<StepOutcome>) {
        let mut csm = ConnectionStateMachine::new();
        let outcomes = self.run_on(&mut csm);
        (csm, outcomes)
    }

    /// Run every step in order against an already-constructed machine
    /// (useful for continuing a scenario from a state built up by a prior
    /// one, e.g. starting a cancellation scenario from `ready`).
    pub fn run_on(self, csm: &mut ConnectionStateMachine) -> Vec<StepOutcome> {
        tracing::debug!(scenario = self.name, steps = self.steps.len(), "running scenario");
        self.steps
            .into_iter()
            .map(|step| {
                let action = (step.apply)(csm);
                StepOutcome {
                    label: step.label,
                    action,
                }
            })
            .collect()
    }
}

/// Assert that the `n`th outcome's action matches `pattern`, panicking with
/// the step's label and the actual action on mismatch.
#[macro_export]
macro_rules! assert_step_matches {
    ($outcomes:expr, $n:expr, $pattern:pat) => {{
        let outcome = &$outcomes[$n];
        assert!(
            matches!(&outcome.action, $pattern),
            "scenario step {:?} (index {}) produced unexpected action: {:?}",
            outcome.label,
            $n,
            outcome.action
        );
    }};
}
