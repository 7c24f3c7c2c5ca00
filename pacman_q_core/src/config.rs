//! Game configuration: maze literal, ghost roster, rewards, and learning parameters.
//!
//! One engine, many configurations. Every tunable magnitude lives here and is
//! handed to [`Environment`](crate::environment::Environment) and
//! [`QAgent`](crate::agent::QAgent) at construction.

use serde::{Deserialize, Serialize};

use crate::{
    Position,
    ghost::{GhostPolicy, GhostSpec},
    map::{Maze, MazeError},
};

/// 11x11 maze with a power pellet in each corner.
pub const CLASSIC_MAZE: &str = "
xxxxxxxxxxx
xo.......ox
x.xxx.xxx.x
x.x.....x.x
x.x.x.x.x.x
x...x.x...x
x.x.xxx.x.x
x.x.....x.x
x.xxx.xxx.x
xo.......ox
xxxxxxxxxxx
";

/// Narrower 9x10 maze used by the single-ghost preset.
pub const SMALL_MAZE: &str = "
xxxxxxxxx
xo.....ox
x.xx.xx.x
x.x...x.x
x.x.x.x.x
x.x.x.x.x
x.x...x.x
x.xx.xx.x
xo.....ox
xxxxxxxxx
";

/// Represents errors detected while validating a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Maze(#[from] MazeError),
    #[error("No start position configured and no 'P' marker found in the maze.")]
    MissingStart,
    #[error("Start position ({row}, {col}) is not a walkable cell.")]
    BlockedStart { row: isize, col: isize },
    #[error("Ghost '{name}' starts on a non-walkable cell ({row}, {col}).")]
    BlockedGhostStart { name: String, row: isize, col: isize },
    #[error("Ghost '{name}' flanks ghost #{leader}, which does not move before it.")]
    FlankLeader { name: String, leader: usize },
    #[error("Ghost '{name}' looks {lookahead} cells ahead; at most {limit} is allowed.")]
    Lookahead {
        name: String,
        lookahead: isize,
        limit: usize,
    },
    #[error("Vision window size must be odd, got {0}.")]
    VisionSize(usize),
    #[error("{name} must lie in {range}, got {value}.")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },
    #[error("Reward ordering violated: {0}.")]
    RewardOrdering(&'static str),
}

/// Reward magnitudes for every transition outcome.
///
/// Each of `win_bonus`, `pellet_bonus` and `|step_penalty|` must be at least
/// [`Rewards::DOMINANCE`] times the next, and `ghost_penalty` must be the
/// most negative term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rewards {
    /// Trying to leave the grid.
    pub out_penalty: f64,
    /// Bumping into a wall.
    pub wall_penalty: f64,
    /// Being caught by a ghost.
    pub ghost_penalty: f64,
    /// Eating a frightened ghost.
    pub eat_ghost_bonus: f64,
    pub pellet_bonus: f64,
    /// Added on top of the pellet bonus when the last pellet is collected.
    pub win_bonus: f64,
    /// Moving onto an empty floor cell.
    pub step_penalty: f64,
    /// Added when entering a cell already visited this episode.
    pub repeat_penalty: f64,
}

impl Default for Rewards {
    fn default() -> Self {
        Rewards {
            out_penalty: -200.0,
            wall_penalty: -200.0,
            ghost_penalty: -20_000.0,
            eat_ghost_bonus: 2_000.0,
            pellet_bonus: 1_000.0,
            win_bonus: 50_000.0,
            step_penalty: -1.0,
            repeat_penalty: -5.0,
        }
    }
}

impl Rewards {
    /// Minimum ratio between consecutive terms of the win > pellet > step ordering.
    pub const DOMINANCE: f64 = 10.0;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.win_bonus < Self::DOMINANCE * self.pellet_bonus {
            return Err(ConfigError::RewardOrdering(
                "win_bonus must be at least 10x pellet_bonus",
            ));
        }
        if self.pellet_bonus < Self::DOMINANCE * self.step_penalty.abs() {
            return Err(ConfigError::RewardOrdering(
                "pellet_bonus must be at least 10x the step penalty magnitude",
            ));
        }
        let worst_other = [
            self.out_penalty,
            self.wall_penalty,
            self.step_penalty,
            self.repeat_penalty,
        ]
        .into_iter()
        .fold(0.0_f64, f64::min);
        if self.ghost_penalty >= worst_other || self.ghost_penalty.abs() <= self.pellet_bonus {
            return Err(ConfigError::RewardOrdering(
                "ghost_penalty must be the dominant negative reward",
            ));
        }
        Ok(())
    }
}

/// Q-learning hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningParams {
    /// Step size α, in (0, 1].
    pub learning_rate: f64,
    /// Discount γ, in [0, 1].
    pub discount_factor: f64,
    /// Initial ε for ε-greedy exploration.
    pub exploration: f64,
    /// Factor applied to ε every time a random action is taken.
    pub exploration_decay: f64,
}

impl Default for LearningParams {
    fn default() -> Self {
        LearningParams {
            learning_rate: 0.2,
            discount_factor: 0.95,
            exploration: 1.0,
            exploration_decay: 0.99995,
        }
    }
}

impl LearningParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("learning_rate", "(0, 1]", self.learning_rate, |v| {
            v > 0.0 && v <= 1.0
        })?;
        check_range("discount_factor", "[0, 1]", self.discount_factor, |v| {
            (0.0..=1.0).contains(&v)
        })?;
        check_range("exploration", "[0, 1]", self.exploration, |v| {
            (0.0..=1.0).contains(&v)
        })?;
        check_range("exploration_decay", "(0, 1]", self.exploration_decay, |v| {
            v > 0.0 && v <= 1.0
        })
    }
}

fn check_range(
    name: &'static str,
    range: &'static str,
    value: f64,
    ok: impl Fn(f64) -> bool,
) -> Result<(), ConfigError> {
    if ok(value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, range, value })
    }
}

/// Which features make up the RL state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateFeatures {
    /// Side length of the square tile window centred on the agent. Must be odd.
    pub vision_size: usize,
    /// Include per-direction distances to the nearest pellet.
    pub pellet_distances: bool,
    /// Include per-direction distances to the nearest ghost.
    pub ghost_distances: bool,
}

impl Default for StateFeatures {
    fn default() -> Self {
        StateFeatures {
            vision_size: 5,
            pellet_distances: true,
            ghost_distances: true,
        }
    }
}

/// What happens when the agent and a dangerous ghost meet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePolicy {
    /// The agent ends up on the ghost's cell and the episode is lost.
    #[default]
    EndEpisode,
    /// The agent is sent back to its start cell and play continues.
    ResetPosition,
}

/// Anti-looping escape hatch for ghosts.
///
/// When a ghost's planned next cell is among its last `window` cells, it
/// takes a random open neighbour instead with the given probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopEscape {
    pub window: usize,
    pub probability: f64,
}

/// Complete description of one game: maze, ghosts, rewards, and learner.
///
/// When deserialized, only `maze` is required. Absent optional fields stay
/// `None` and an absent ghost list is empty; the preset values of
/// [`GameConfig::default`] never leak into a loaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Maze literal; see [`Maze::parse`].
    pub maze: String,
    /// Agent start cell. Falls back to the maze's `P` marker when absent.
    #[serde(default)]
    pub start: Option<Position>,
    /// Ghosts in evaluation order.
    #[serde(default)]
    pub ghosts: Vec<GhostSpec>,
    #[serde(default)]
    pub rewards: Rewards,
    #[serde(default)]
    pub learning: LearningParams,
    #[serde(default)]
    pub features: StateFeatures,
    #[serde(default)]
    pub capture: CapturePolicy,
    /// Ticks a power pellet keeps ghosts frightened.
    #[serde(default = "default_frightened_duration")]
    pub frightened_duration: u32,
    #[serde(default)]
    pub loop_escape: Option<LoopEscape>,
    /// Seed for every random draw; `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_frightened_duration() -> u32 {
    20
}

impl Default for GameConfig {
    /// Classic maze with a direct chaser and a flanker that pivots on it.
    fn default() -> Self {
        GameConfig {
            maze: CLASSIC_MAZE.to_string(),
            start: Some(Position::new(1, 1)),
            ghosts: vec![
                GhostSpec::new(
                    "blinky",
                    GhostPolicy::Direct,
                    Position::new(9, 7),
                    Position::new(1, 9),
                ),
                GhostSpec::new(
                    "inky",
                    GhostPolicy::Flank {
                        leader: 0,
                        lookahead: 2,
                    },
                    Position::new(1, 9),
                    Position::new(9, 1),
                ),
            ],
            rewards: Rewards::default(),
            learning: LearningParams::default(),
            features: StateFeatures::default(),
            capture: CapturePolicy::EndEpisode,
            frightened_duration: default_frightened_duration(),
            loop_escape: None,
            seed: None,
        }
    }
}

impl GameConfig {
    /// The classic four-ghost roster on the classic maze.
    pub fn four_ghosts() -> Self {
        GameConfig {
            ghosts: vec![
                GhostSpec::new(
                    "blinky",
                    GhostPolicy::Conditional { threshold: 6 },
                    Position::new(9, 5),
                    Position::new(1, 9),
                ),
                GhostSpec::new(
                    "pinky",
                    GhostPolicy::Ambush {
                        lookahead: 4,
                        clamp: true,
                    },
                    Position::new(5, 5),
                    Position::new(1, 1),
                ),
                GhostSpec::new(
                    "inky",
                    GhostPolicy::Flank {
                        leader: 0,
                        lookahead: 2,
                    },
                    Position::new(9, 7),
                    Position::new(9, 1),
                ),
                GhostSpec::new(
                    "clyde",
                    GhostPolicy::Conditional { threshold: 8 },
                    Position::new(7, 5),
                    Position::new(9, 9),
                ),
            ],
            ..GameConfig::default()
        }
    }

    /// One direct chaser on the small maze; captures send the agent home.
    pub fn single_ghost() -> Self {
        GameConfig {
            maze: SMALL_MAZE.to_string(),
            start: Some(Position::new(1, 1)),
            ghosts: vec![GhostSpec::new(
                "blinky",
                GhostPolicy::Direct,
                Position::new(7, 7),
                Position::new(1, 7),
            )],
            rewards: Rewards {
                out_penalty: -100.0,
                wall_penalty: -100.0,
                ghost_penalty: -2_000.0,
                pellet_bonus: 100.0,
                win_bonus: 2_000.0,
                eat_ghost_bonus: 400.0,
                ..Rewards::default()
            },
            learning: LearningParams {
                learning_rate: 0.7,
                ..LearningParams::default()
            },
            features: StateFeatures {
                vision_size: 3,
                pellet_distances: true,
                ghost_distances: false,
            },
            capture: CapturePolicy::ResetPosition,
            ..GameConfig::default()
        }
    }

    /// Parses the maze and checks every invariant the engine relies on.
    ///
    /// Returns the parsed maze and the resolved agent start cell.
    pub fn build_maze(&self) -> Result<(Maze, Position), ConfigError> {
        let maze = Maze::parse(&self.maze)?;

        let start = self
            .start
            .or(maze.start_marker())
            .ok_or(ConfigError::MissingStart)?;
        if !maze.is_walkable(start) {
            return Err(ConfigError::BlockedStart {
                row: start.row,
                col: start.col,
            });
        }

        for (index, ghost) in self.ghosts.iter().enumerate() {
            if !maze.is_walkable(ghost.start) {
                return Err(ConfigError::BlockedGhostStart {
                    name: ghost.name.clone(),
                    row: ghost.start.row,
                    col: ghost.start.col,
                });
            }
            let lookahead = match ghost.policy {
                GhostPolicy::Flank { leader, .. } if leader >= index => {
                    return Err(ConfigError::FlankLeader {
                        name: ghost.name.clone(),
                        leader,
                    });
                }
                GhostPolicy::Flank { lookahead, .. } | GhostPolicy::Ambush { lookahead, .. } => {
                    lookahead
                }
                GhostPolicy::Direct | GhostPolicy::Conditional { .. } => 0,
            };
            // Targets are computed from the lookahead; keep them within a maze span.
            let limit = maze.width().max(maze.height());
            if lookahead.unsigned_abs() > limit {
                return Err(ConfigError::Lookahead {
                    name: ghost.name.clone(),
                    lookahead,
                    limit,
                });
            }
        }

        if self.features.vision_size % 2 == 0 {
            return Err(ConfigError::VisionSize(self.features.vision_size));
        }
        if let Some(escape) = self.loop_escape {
            check_range("loop_escape.probability", "[0, 1]", escape.probability, |v| {
                (0.0..=1.0).contains(&v)
            })?;
        }
        self.rewards.validate()?;
        self.learning.validate()?;

        Ok((maze, start))
    }

    /// Validates the configuration without keeping the parsed maze.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build_maze().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        GameConfig::default().validate().unwrap();
        GameConfig::four_ghosts().validate().unwrap();
        GameConfig::single_ghost().validate().unwrap();
    }

    #[test]
    fn test_start_falls_back_to_marker() {
        let config = GameConfig {
            maze: "xxxxx\nx.P.x\nxxxxx".to_string(),
            start: None,
            ghosts: vec![],
            ..GameConfig::default()
        };
        let (_, start) = config.build_maze().unwrap();
        assert_eq!(start, Position::new(1, 2));

        let config = GameConfig {
            maze: "xxxxx\nx...x\nxxxxx".to_string(),
            ..config
        };
        assert_eq!(config.validate(), Err(ConfigError::MissingStart));
    }

    #[test]
    fn test_json_fields_default_to_empty() {
        let config: GameConfig =
            serde_json::from_str(r#"{ "maze": "xxxxx\nx.P.x\nxxxxx" }"#).unwrap();
        assert_eq!(config.start, None);
        assert!(config.ghosts.is_empty());
        assert_eq!(config.seed, None);
        assert_eq!(config.loop_escape, None);
        assert_eq!(config.frightened_duration, 20);
        assert_eq!(config.rewards, Rewards::default());

        let (_, start) = config.build_maze().unwrap();
        assert_eq!(start, Position::new(1, 2));
    }

    #[test]
    fn test_json_requires_maze() {
        assert!(serde_json::from_str::<GameConfig>(r#"{ "ghosts": [] }"#).is_err());
    }

    #[test]
    fn test_blocked_positions_rejected() {
        let config = GameConfig {
            start: Some(Position::new(0, 0)),
            ..GameConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::BlockedStart { row: 0, col: 0 })
        );

        let mut config = GameConfig::default();
        config.ghosts[0].start = Position::new(2, 2);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BlockedGhostStart { .. })
        ));
    }

    #[test]
    fn test_flank_leader_must_move_first() {
        let mut config = GameConfig::default();
        config.ghosts.swap(0, 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FlankLeader { leader: 0, .. })
        ));
    }

    #[test]
    fn test_oversized_lookahead_rejected() {
        let mut config = GameConfig::four_ghosts();
        config.ghosts[1].policy = GhostPolicy::Ambush {
            lookahead: isize::MAX,
            clamp: true,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Lookahead { limit: 11, .. })
        ));

        let mut config = GameConfig::default();
        config.ghosts[1].policy = GhostPolicy::Flank {
            leader: 0,
            lookahead: -12,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Lookahead { lookahead: -12, .. })
        ));

        config.ghosts[1].policy = GhostPolicy::Flank {
            leader: 0,
            lookahead: -11,
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_even_vision_rejected() {
        let mut config = GameConfig::default();
        config.features.vision_size = 4;
        assert_eq!(config.validate(), Err(ConfigError::VisionSize(4)));
    }

    #[test]
    fn test_reward_ordering() {
        let mut rewards = Rewards::default();
        rewards.win_bonus = 10.0;
        assert!(rewards.validate().is_err());

        let mut rewards = Rewards::default();
        rewards.ghost_penalty = -50.0;
        assert!(rewards.validate().is_err());

        // Strictly larger is not enough; the pellet must dwarf the step cost.
        let mut rewards = Rewards::default();
        rewards.pellet_bonus = 5.0;
        rewards.step_penalty = -1.0;
        assert!(matches!(
            rewards.validate(),
            Err(ConfigError::RewardOrdering(_))
        ));
        rewards.pellet_bonus = 10.0;
        rewards.validate().unwrap();

        for config in [
            GameConfig::default(),
            GameConfig::four_ghosts(),
            GameConfig::single_ghost(),
        ] {
            let rewards = config.rewards;
            assert!(rewards.pellet_bonus >= Rewards::DOMINANCE * rewards.step_penalty.abs());
            assert!(rewards.win_bonus >= Rewards::DOMINANCE * rewards.pellet_bonus);
        }
    }

    #[test]
    fn test_learning_ranges() {
        let params = LearningParams {
            learning_rate: 0.0,
            ..LearningParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::OutOfRange {
                name: "learning_rate",
                ..
            })
        ));
        let params = LearningParams {
            discount_factor: 1.5,
            ..LearningParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_malformed_maze_is_config_error() {
        let config = GameConfig {
            maze: "xxx\nxx\nxxx".to_string(),
            ..GameConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Maze(_))));
    }
}
