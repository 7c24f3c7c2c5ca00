//! Scripted ghosts and the policies that steer them.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

use crate::{
    Action, Position,
    config::LoopEscape,
    map::Maze,
    pathfinding::{shortest_next_step, walkable_neighbors},
};

/// How a ghost picks its target cell while not frightened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GhostPolicy {
    /// Head straight for the agent.
    Direct,
    /// Chase while farther than `threshold` (manhattan), otherwise retreat to the scatter corner.
    Conditional { threshold: usize },
    /// Aim `lookahead` cells ahead of the agent along its last move.
    Ambush { lookahead: isize, clamp: bool },
    /// Mirror ghost `leader` through the cell `lookahead` steps ahead of the agent.
    ///
    /// The leader must come earlier in the roster so its position is already
    /// updated for the current tick.
    Flank { leader: usize, lookahead: isize },
}

/// Static description of a ghost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GhostSpec {
    pub name: String,
    pub policy: GhostPolicy,
    pub start: Position,
    /// Corner the ghost retreats to when frightened (and, for conditional ghosts, when close).
    pub scatter: Position,
}

impl GhostSpec {
    pub fn new(name: &str, policy: GhostPolicy, start: Position, scatter: Position) -> Self {
        GhostSpec {
            name: name.to_string(),
            policy,
            start,
            scatter,
        }
    }
}

/// Live state of one ghost.
#[derive(Debug, Clone)]
pub struct Ghost {
    pub spec: GhostSpec,
    pub position: Position,
    /// Eaten during the current frightened activation.
    pub eaten: bool,
    recent: VecDeque<Position>,
}

impl Ghost {
    fn new(spec: GhostSpec) -> Self {
        Ghost {
            position: spec.start,
            spec,
            eaten: false,
            recent: VecDeque::new(),
        }
    }

    fn send_home(&mut self) {
        self.position = self.spec.start;
        self.recent.clear();
    }
}

/// Owns every ghost plus the shared frightened countdown.
#[derive(Debug, Clone)]
pub struct GhostController {
    ghosts: Vec<Ghost>,
    frightened: u32,
    loop_escape: Option<LoopEscape>,
    rng: StdRng,
}

impl GhostController {
    pub fn new(specs: &[GhostSpec], loop_escape: Option<LoopEscape>, seed: Option<u64>) -> Self {
        let rng = match seed {
            // Decorrelated from the agent's stream, which uses the seed as-is.
            Some(seed) => StdRng::seed_from_u64(seed.rotate_left(32) ^ 0x9E37_79B9_7F4A_7C15),
            None => StdRng::from_os_rng(),
        };
        GhostController {
            ghosts: specs.iter().cloned().map(Ghost::new).collect(),
            frightened: 0,
            loop_escape,
            rng,
        }
    }

    pub fn ghosts(&self) -> &[Ghost] {
        &self.ghosts
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.ghosts.iter().map(|ghost| ghost.position)
    }

    /// Sends every ghost home and clears the frightened state.
    pub fn reset(&mut self) {
        for ghost in &mut self.ghosts {
            ghost.send_home();
            ghost.eaten = false;
        }
        self.frightened = 0;
    }

    #[inline]
    pub fn is_frightened(&self) -> bool {
        self.frightened > 0
    }

    /// Remaining frightened ticks.
    pub fn frightened_ticks(&self) -> u32 {
        self.frightened
    }

    /// (Re)arms the frightened countdown and forgets which ghosts were eaten.
    pub fn arm_frightened(&mut self, duration: u32) {
        self.frightened = duration;
        for ghost in &mut self.ghosts {
            ghost.eaten = false;
        }
    }

    /// Advances the frightened countdown by one tick.
    pub fn tick_frightened(&mut self) {
        if self.frightened == 0 {
            return;
        }
        self.frightened -= 1;
        if self.frightened == 0 {
            for ghost in &mut self.ghosts {
                ghost.eaten = false;
            }
        }
    }

    /// Index of the first ghost standing on `pos`.
    pub fn ghost_at(&self, pos: Position) -> Option<usize> {
        self.ghosts.iter().position(|ghost| ghost.position == pos)
    }

    /// Index of the first ghost on `pos` that is still in play.
    ///
    /// Ghosts eaten during the current frightened activation are ignored.
    pub fn active_ghost_at(&self, pos: Position) -> Option<usize> {
        let frightened = self.is_frightened();
        self.ghosts
            .iter()
            .position(|ghost| ghost.position == pos && !(frightened && ghost.eaten))
    }

    /// Whether the agent can eat ghost `index` right now.
    pub fn is_capturable(&self, index: usize) -> bool {
        self.is_frightened() && self.ghosts.get(index).is_some_and(|ghost| !ghost.eaten)
    }

    /// Marks ghost `index` as eaten and returns it to its start cell.
    pub fn eat(&mut self, index: usize) {
        if let Some(ghost) = self.ghosts.get_mut(index) {
            ghost.eaten = true;
            ghost.send_home();
        }
    }

    /// Moves every ghost one step, in roster order.
    ///
    /// `agent` is the agent's position after its move this tick and
    /// `last_action` its most recent move (no heading before the first move).
    pub fn move_ghosts(&mut self, maze: &Maze, agent: Position, last_action: Option<Action>) {
        let heading = last_action.map_or((0, 0), Action::delta);
        let frightened = self.is_frightened();

        for index in 0..self.ghosts.len() {
            if frightened && self.ghosts[index].eaten {
                continue;
            }
            let target = if frightened {
                self.ghosts[index].spec.scatter
            } else {
                self.target(index, maze, agent, heading)
            };

            let current = self.ghosts[index].position;
            let mut next = shortest_next_step(maze, current, target);
            if next != current {
                next = self.maybe_escape_loop(index, maze, next);
            }

            let ghost = &mut self.ghosts[index];
            if let Some(escape) = self.loop_escape {
                ghost.recent.push_back(current);
                while ghost.recent.len() > escape.window {
                    ghost.recent.pop_front();
                }
            }
            ghost.position = next;
        }
    }

    /// Target cell of ghost `index` under its chase policy.
    fn target(&self, index: usize, maze: &Maze, agent: Position, heading: (isize, isize)) -> Position {
        let ghost = &self.ghosts[index];
        match ghost.spec.policy {
            GhostPolicy::Direct => agent,
            GhostPolicy::Conditional { threshold } => {
                if ghost.position.manhattan(agent) > threshold {
                    agent
                } else {
                    ghost.spec.scatter
                }
            }
            GhostPolicy::Ambush { lookahead, clamp } => {
                let ahead = agent.offset(heading, lookahead);
                if clamp { maze.clamp(ahead) } else { ahead }
            }
            GhostPolicy::Flank { leader, lookahead } => {
                let pivot = agent.offset(heading, lookahead);
                let anchor = self.ghosts.get(leader).map_or(pivot, |g| g.position);
                anchor.offset((pivot.row - anchor.row, pivot.col - anchor.col), 2)
            }
        }
    }

    fn maybe_escape_loop(&mut self, index: usize, maze: &Maze, next: Position) -> Position {
        let Some(escape) = self.loop_escape else {
            return next;
        };
        let ghost = &self.ghosts[index];
        if !ghost.recent.contains(&next) || !self.rng.random_bool(escape.probability) {
            return next;
        }
        let options: Vec<Position> = walkable_neighbors(maze, ghost.position)
            .filter(|&cell| cell != next)
            .collect();
        let escaped = options.choose(&mut self.rng).copied().unwrap_or(next);
        tracing::trace!(ghost = %ghost.spec.name, ?escaped, "loop escape");
        escaped
    }
}
