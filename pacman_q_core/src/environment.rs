use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, trace};

use crate::{
    Action, Position,
    config::{CapturePolicy, ConfigError, GameConfig, Rewards, StateFeatures},
    ghost::{Ghost, GhostController},
    map::{Maze, Tile},
    state::{self, State},
};

/// Where the current episode stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeStatus {
    Playing,
    /// Every pellet has been collected.
    Won,
    /// Caught by a ghost under `CapturePolicy::EndEpisode`.
    Lost,
}

/// Represents what happened to the agent's move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Out of bounds or into a wall; the agent did not move.
    Blocked,
    /// Walked into a dangerous ghost.
    Captured,
    /// Walked into a frightened ghost and ate it.
    AteGhost(usize),
    /// Picked up a pellet or power pellet.
    Collected(Tile),
    /// Plain move onto empty floor.
    Moved,
    /// The episode was already over; nothing happened.
    EpisodeOver,
}

/// Result of `Environment::step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub position: Position,
    pub reward: f64,
    pub transition: Transition,
}

/// Contact between a ghost and the agent caused by a ghost move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contact {
    /// A dangerous ghost reached the agent.
    Caught(usize),
    /// A frightened ghost blundered into the agent and was eaten.
    Eaten(usize),
}

/// Read-only snapshot for renderers: everything needed to draw a frame.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub agent: Position,
    pub score: f64,
    pub ghosts: &'a [Ghost],
    pub pellets: &'a BTreeSet<Position>,
    pub maze: &'a Maze,
    pub status: EpisodeStatus,
    pub frightened_ticks: u32,
}

/// The maze, its ghosts, and the transition/reward function.
#[derive(Debug, Clone)]
pub struct Environment {
    maze: Maze,
    ghosts: GhostController,
    start: Position,
    visited: HashSet<Position>,
    rewards: Rewards,
    features: StateFeatures,
    capture: CapturePolicy,
    frightened_duration: u32,
    status: EpisodeStatus,
}

impl Environment {
    /// Builds an environment from a validated configuration.
    pub fn new(config: &GameConfig) -> Result<Self, ConfigError> {
        let (maze, start) = config.build_maze()?;
        Ok(Environment {
            maze,
            ghosts: GhostController::new(&config.ghosts, config.loop_escape, config.seed),
            start,
            visited: HashSet::new(),
            rewards: config.rewards,
            features: config.features,
            capture: config.capture,
            frightened_duration: config.frightened_duration,
            status: EpisodeStatus::Playing,
        })
    }

    pub fn maze(&self) -> &Maze {
        &self.maze
    }

    pub fn ghosts(&self) -> &GhostController {
        &self.ghosts
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn rewards(&self) -> &Rewards {
        &self.rewards
    }

    pub fn capture_policy(&self) -> CapturePolicy {
        self.capture
    }

    pub fn status(&self) -> EpisodeStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status != EpisodeStatus::Playing
    }

    pub fn visited(&self) -> &HashSet<Position> {
        &self.visited
    }

    /// Restores the maze, sends the ghosts home, and forgets visited cells.
    pub fn reset(&mut self) {
        self.maze.reset();
        self.ghosts.reset();
        self.visited.clear();
        self.status = EpisodeStatus::Playing;
    }

    /// Applies `action` from `position` and returns the new position and reward.
    ///
    /// Ghosts do not move here; the caller invokes [`Environment::move_ghosts`]
    /// right after, with the resulting position.
    pub fn step(&mut self, position: Position, action: Action) -> StepOutcome {
        if self.is_terminal() {
            return StepOutcome {
                position,
                reward: 0.0,
                transition: Transition::EpisodeOver,
            };
        }

        let candidate = position.offset(action.delta(), 1);
        let tile = self.maze.tile_at(candidate);
        let (position, mut reward, transition) = match tile {
            Tile::OutOfBounds => (position, self.rewards.out_penalty, Transition::Blocked),
            Tile::Wall => (position, self.rewards.wall_penalty, Transition::Blocked),
            _ => match self.ghosts.ghost_at(candidate) {
                Some(index) if self.ghosts.is_capturable(index) => {
                    debug!(ghost = index, ?candidate, "ghost eaten");
                    self.ghosts.eat(index);
                    (
                        candidate,
                        self.rewards.eat_ghost_bonus,
                        Transition::AteGhost(index),
                    )
                }
                Some(index) => {
                    debug!(ghost = index, ?candidate, policy = ?self.capture, "agent captured");
                    let position = match self.capture {
                        CapturePolicy::EndEpisode => {
                            self.status = EpisodeStatus::Lost;
                            candidate
                        }
                        CapturePolicy::ResetPosition => self.start,
                    };
                    (position, self.rewards.ghost_penalty, Transition::Captured)
                }
                None if tile.is_pellet() => {
                    self.maze.collect(candidate);
                    if tile == Tile::PowerPellet {
                        debug!(ticks = self.frightened_duration, "power pellet armed");
                        self.ghosts.arm_frightened(self.frightened_duration);
                    }
                    let mut reward = self.rewards.pellet_bonus;
                    if self.maze.all_collected() {
                        info!("all pellets collected");
                        reward += self.rewards.win_bonus;
                        self.status = EpisodeStatus::Won;
                    }
                    (candidate, reward, Transition::Collected(tile))
                }
                None => (candidate, self.rewards.step_penalty, Transition::Moved),
            },
        };

        if transition != Transition::Captured && !self.visited.insert(position) {
            reward += self.rewards.repeat_penalty;
        }
        self.ghosts.tick_frightened();

        trace!(?action, ?position, reward, ?transition, "step");
        StepOutcome {
            position,
            reward,
            transition,
        }
    }

    /// Moves every ghost one step toward its target and reports contact with the agent.
    ///
    /// Contact carries its own reward, added on top of the tick's step reward:
    /// `ghost_penalty` when the agent is caught, `eat_ghost_bonus` when a
    /// frightened ghost runs into it. A catch ends the episode under
    /// `CapturePolicy::EndEpisode`; under `ResetPosition` the caller is
    /// expected to send the agent home. Nothing moves once the episode is over.
    pub fn move_ghosts(
        &mut self,
        agent: Position,
        last_action: Option<Action>,
    ) -> Option<(Contact, f64)> {
        if self.is_terminal() {
            return None;
        }
        self.ghosts.move_ghosts(&self.maze, agent, last_action);

        let index = self.ghosts.active_ghost_at(agent)?;
        if self.ghosts.is_capturable(index) {
            debug!(ghost = index, "frightened ghost ran into the agent");
            self.ghosts.eat(index);
            return Some((Contact::Eaten(index), self.rewards.eat_ghost_bonus));
        }
        debug!(ghost = index, ?agent, "ghost caught the agent");
        if self.capture == CapturePolicy::EndEpisode {
            self.status = EpisodeStatus::Lost;
        }
        Some((Contact::Caught(index), self.rewards.ghost_penalty))
    }

    /// Tile window centred on `position`.
    pub fn vision(&self, position: Position) -> Vec<Tile> {
        state::vision_window(&self.maze, position, self.features.vision_size)
    }

    /// Per-direction distances (up, right, down, left) to the nearest pellet.
    pub fn pellet_distances(&self, position: Position) -> state::Directional {
        state::directional_distances(position, self.maze.pellets().iter().copied())
    }

    /// Per-direction distances (up, right, down, left) to the nearest ghost.
    pub fn ghost_distances(&self, position: Position) -> state::Directional {
        state::directional_distances(position, self.ghosts.positions())
    }

    /// Builds the RL state key for an agent standing on `position`.
    pub fn observe_state(&self, position: Position) -> State {
        State {
            vision: self.vision(position),
            pellet_distances: self
                .features
                .pellet_distances
                .then(|| self.pellet_distances(position)),
            ghost_distances: self
                .features
                .ghost_distances
                .then(|| self.ghost_distances(position)),
        }
    }
}
