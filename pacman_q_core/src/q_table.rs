//! Q-table implementation for one-step tabular Q-learning

use std::collections::HashMap;

use rand::{Rng, seq::IndexedRandom};

use crate::{Action, state::State};

/// Estimated values of every action in one state, indexed by `Action::index`.
pub type ActionValues = [f64; 4];

/// Q-table mapping states to a full row of action values.
///
/// Rows are created lazily, all four actions at once with value 0.0, the
/// first time a state takes part in an update.
#[derive(Debug, Clone, PartialEq)]
pub struct QTable {
    rows: HashMap<State, ActionValues>,
    /// Learning rate α
    learning_rate: f64,
    /// Discount factor γ
    discount_factor: f64,
}

impl QTable {
    /// Create a new, empty Q-table
    pub fn new(learning_rate: f64, discount_factor: f64) -> Self {
        Self {
            rows: HashMap::new(),
            learning_rate,
            discount_factor,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn discount_factor(&self) -> f64 {
        self.discount_factor
    }

    /// Number of states with a row.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for `state`, if it has been materialized.
    pub fn row(&self, state: &State) -> Option<&ActionValues> {
        self.rows.get(state)
    }

    /// Stored value for a state-action pair, if the state has a row.
    pub fn value(&self, state: &State, action: Action) -> Option<f64> {
        self.rows.get(state).map(|values| values[action.index()])
    }

    /// Returns the row for `state`, creating a zeroed one if absent.
    pub fn ensure_row(&mut self, state: &State) -> &mut ActionValues {
        self.rows.entry(state.clone()).or_insert([0.0; 4])
    }

    /// Greedy action for `state`, breaking ties uniformly at random.
    ///
    /// For an unseen state a uniformly random action is returned and no row
    /// is created.
    pub fn best_action<R: Rng + ?Sized>(&self, state: &State, rng: &mut R) -> Action {
        let Some(values) = self.rows.get(state) else {
            return Action::ALL[rng.random_range(0..Action::ALL.len())];
        };
        let best = max_value(values);
        let candidates: Vec<Action> = Action::ALL
            .into_iter()
            .filter(|action| values[action.index()] == best)
            .collect();
        candidates.choose(rng).copied().unwrap_or(Action::Up)
    }

    /// Q-learning update: off-policy TD control
    ///
    /// Q(s,a) ← Q(s,a) + α[r + γ max_a' Q(s',a') - Q(s,a)]
    ///
    /// Returns the new value of Q(s,a).
    pub fn update(&mut self, state: &State, action: Action, reward: f64, next_state: &State) -> f64 {
        let max_next = max_value(self.ensure_row(next_state));
        let (learning_rate, discount_factor) = (self.learning_rate, self.discount_factor);

        let slot = &mut self.ensure_row(state)[action.index()];
        let td_error = reward + discount_factor * max_next - *slot;
        *slot += learning_rate * td_error;
        *slot
    }

    /// Iterates every `(state, values)` row.
    pub fn rows(&self) -> impl Iterator<Item = (&State, &ActionValues)> {
        self.rows.iter()
    }

    /// Replaces every row, keeping the hyper-parameters.
    pub fn replace_rows(&mut self, rows: impl IntoIterator<Item = (State, ActionValues)>) {
        self.rows = rows.into_iter().collect();
    }
}

fn max_value(values: &ActionValues) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}
