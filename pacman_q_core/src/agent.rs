use std::path::Path;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info, trace};

use crate::{
    Action, Position,
    config::{CapturePolicy, ConfigError, GameConfig},
    environment::{Contact, EpisodeStatus, Environment, Observation, Transition},
    persistence::{self, PersistenceError},
    q_table::QTable,
    state::State,
};

/// What one call to [`QAgent::step`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentStep {
    pub action: Action,
    /// Step reward plus the reward of any ghost contact.
    pub reward: f64,
    pub transition: Transition,
    /// Ghost contact caused by the ghost moves that followed the agent's move.
    pub contact: Option<Contact>,
}

/// Outcome of [`QAgent::run_episode`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub score: f64,
    pub steps: usize,
    pub status: EpisodeStatus,
}

/// A tabular Q-learning agent playing one environment.
///
/// Each tick runs agent move, then ghost moves, then the Q-update, so the
/// next state fed to the update reflects the ghosts' new positions.
#[derive(Debug)]
pub struct QAgent {
    env: Environment,
    qtable: QTable,
    position: Position,
    score: f64,
    episode_steps: usize,
    history: Vec<f64>,
    exploration: f64,
    exploration_decay: f64,
    last_action: Option<Action>,
    rng: StdRng,
}

impl QAgent {
    pub fn new(config: &GameConfig) -> Result<Self, ConfigError> {
        let env = Environment::new(config)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(QAgent {
            position: env.start(),
            env,
            qtable: QTable::new(config.learning.learning_rate, config.learning.discount_factor),
            score: 0.0,
            episode_steps: 0,
            history: Vec::new(),
            exploration: config.learning.exploration,
            exploration_decay: config.learning.exploration_decay,
            last_action: None,
            rng,
        })
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Sum of rewards since the last reset.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Scores of finished episodes, oldest first.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// Ticks played since the last reset.
    pub fn episode_steps(&self) -> usize {
        self.episode_steps
    }

    pub fn exploration(&self) -> f64 {
        self.exploration
    }

    pub fn last_action(&self) -> Option<Action> {
        self.last_action
    }

    pub fn qtable(&self) -> &QTable {
        &self.qtable
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Read-only snapshot for rendering.
    pub fn observe(&self) -> Observation<'_> {
        Observation {
            agent: self.position,
            score: self.score,
            ghosts: self.env.ghosts().ghosts(),
            pellets: self.env.maze().pellets(),
            maze: self.env.maze(),
            status: self.env.status(),
            frightened_ticks: self.env.ghosts().frightened_ticks(),
        }
    }

    /// RL state key for the agent's current position.
    pub fn current_state(&self) -> State {
        self.env.observe_state(self.position)
    }

    /// ε-greedy choice for the current state.
    pub fn choose_action(&mut self) -> Action {
        let state = self.current_state();
        self.choose_action_for(&state)
    }

    fn choose_action_for(&mut self, state: &State) -> Action {
        if self.rng.random::<f64>() < self.exploration {
            self.exploration *= self.exploration_decay;
            Action::ALL[self.rng.random_range(0..Action::ALL.len())]
        } else {
            self.qtable.best_action(state, &mut self.rng)
        }
    }

    /// Plays one tick: move, ghost moves, Q-update.
    ///
    /// Picks an ε-greedy action when `action` is `None`. Returns `None`
    /// without touching anything once the episode is over.
    pub fn step(&mut self, action: Option<Action>) -> Option<AgentStep> {
        if self.env.is_terminal() {
            trace!(status = ?self.env.status(), "step ignored, episode over");
            return None;
        }

        let state = self.current_state();
        let action = match action {
            Some(action) => action,
            None => self.choose_action_for(&state),
        };

        let outcome = self.env.step(self.position, action);
        self.position = outcome.position;
        self.last_action = Some(action);

        let mut reward = outcome.reward;
        let contact = match self.env.move_ghosts(self.position, self.last_action) {
            Some((contact, contact_reward)) => {
                reward += contact_reward;
                if matches!(contact, Contact::Caught(_))
                    && self.env.capture_policy() == CapturePolicy::ResetPosition
                {
                    self.position = self.env.start();
                }
                Some(contact)
            }
            None => None,
        };

        let next_state = self.current_state();
        self.qtable.update(&state, action, reward, &next_state);
        self.score += reward;
        self.episode_steps += 1;

        if self.env.is_terminal() {
            info!(
                status = ?self.env.status(),
                score = self.score,
                steps = self.episode_steps,
                "episode finished"
            );
        }

        Some(AgentStep {
            action,
            reward,
            transition: outcome.transition,
            contact,
        })
    }

    /// Steps until the episode ends or `max_steps` ticks have been played.
    ///
    /// The episode is not reset; call [`QAgent::reset`] afterwards.
    pub fn run_episode(&mut self, max_steps: usize) -> EpisodeSummary {
        while self.episode_steps < max_steps && self.step(None).is_some() {}
        EpisodeSummary {
            score: self.score,
            steps: self.episode_steps,
            status: self.env.status(),
        }
    }

    /// Starts a new episode.
    ///
    /// The finished episode's score is appended to the history if at least
    /// one step was played.
    pub fn reset(&mut self) {
        if self.episode_steps > 0 {
            self.history.push(self.score);
        }
        debug!(score = self.score, episodes = self.history.len(), "reset");
        self.env.reset();
        self.position = self.env.start();
        self.score = 0.0;
        self.episode_steps = 0;
        self.last_action = None;
    }

    /// Re-arms exploration, to 1.0 by default.
    pub fn shake(&mut self, exploration: Option<f64>) {
        self.exploration = exploration.unwrap_or(1.0).clamp(0.0, 1.0);
        debug!(exploration = self.exploration, "exploration re-armed");
    }

    /// Switches to pure exploitation.
    pub fn exploit(&mut self) {
        self.exploration = 0.0;
        debug!("exploration disabled");
    }

    /// Writes the Q-table and score history to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistenceError> {
        persistence::save_to_file(path, &self.qtable, &self.history)
    }

    /// Loads the Q-table and score history from `path`.
    ///
    /// Returns `Ok(false)` and leaves the agent untouched if the file does not exist.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<bool, PersistenceError> {
        let loaded = persistence::load_from_file(
            path,
            self.qtable.learning_rate(),
            self.qtable.discount_factor(),
        )?;
        match loaded {
            Some((qtable, history)) => {
                self.qtable = qtable;
                self.history = history;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
