//! Breadth-first shortest paths over the walkable cells of a maze.

use std::collections::{HashMap, VecDeque};

use crate::{Action, Position, map::Maze};

/// Walkable 4-neighbours of `pos`, visited in `Action::ALL` order (up, down, left, right).
pub fn walkable_neighbors(maze: &Maze, pos: Position) -> impl Iterator<Item = Position> + '_ {
    Action::ALL
        .into_iter()
        .map(move |action| pos.offset(action.delta(), 1))
        .filter(|next| maze.is_walkable(*next))
}

/// Runs BFS from `start` until `goal` is discovered, returning the predecessor map.
///
/// Returns `None` when `goal` cannot be reached.
fn search(maze: &Maze, start: Position, goal: Position) -> Option<HashMap<Position, Position>> {
    if !maze.is_walkable(goal) {
        return None;
    }

    let mut came_from: HashMap<Position, Position> = HashMap::new();
    let mut frontier = VecDeque::from([start]);
    came_from.insert(start, start);

    while let Some(current) = frontier.pop_front() {
        for neighbor in walkable_neighbors(maze, current) {
            if came_from.contains_key(&neighbor) {
                continue;
            }
            came_from.insert(neighbor, current);
            // Goal test on discovery; the first discovery is on a shortest path.
            if neighbor == goal {
                return Some(came_from);
            }
            frontier.push_back(neighbor);
        }
    }

    None
}

/// Returns the first hop on a shortest path from `start` to `goal`.
///
/// Returns `start` unchanged when `start == goal` or when no path exists.
/// Among equal-length paths the one found first in up/down/left/right
/// expansion order wins, so the result is deterministic.
pub fn shortest_next_step(maze: &Maze, start: Position, goal: Position) -> Position {
    if start == goal {
        return start;
    }
    let Some(came_from) = search(maze, start, goal) else {
        return start;
    };

    let mut current = goal;
    while let Some(&previous) = came_from.get(&current) {
        if previous == start {
            return current;
        }
        current = previous;
    }
    start
}

/// Length in steps of a shortest path from `start` to `goal`, if one exists.
pub fn path_length(maze: &Maze, start: Position, goal: Position) -> Option<usize> {
    if start == goal {
        return Some(0);
    }
    let came_from = search(maze, start, goal)?;

    let mut steps = 0;
    let mut current = goal;
    while current != start {
        current = *came_from.get(&current)?;
        steps += 1;
    }
    Some(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORRIDORS: &str = "
xxxxxxx
x.....x
x.xxx.x
x.....x
xxxxxxx
";

    fn pos(row: isize, col: isize) -> Position {
        Position::new(row, col)
    }

    #[test]
    fn test_same_cell_is_no_move() {
        let maze = Maze::parse(CORRIDORS).unwrap();
        assert_eq!(shortest_next_step(&maze, pos(1, 1), pos(1, 1)), pos(1, 1));
        assert_eq!(path_length(&maze, pos(1, 1), pos(1, 1)), Some(0));
    }

    #[test]
    fn test_next_step_is_one_closer() {
        let maze = Maze::parse(CORRIDORS).unwrap();
        let start = pos(1, 1);
        let goal = pos(3, 4);
        let length = path_length(&maze, start, goal).unwrap();
        assert_eq!(length, 5);

        let next = shortest_next_step(&maze, start, goal);
        assert_eq!(start.manhattan(next), 1);
        assert_eq!(path_length(&maze, next, goal), Some(length - 1));
    }

    #[test]
    fn test_tie_break_prefers_up_then_down() {
        // Both ways around the ring are six steps; "left" is expanded before
        // "right", so the western branch reaches the goal first.
        let maze = Maze::parse(CORRIDORS).unwrap();
        assert_eq!(shortest_next_step(&maze, pos(1, 3), pos(3, 3)), pos(1, 2));
        // Going from the left column to the right, "up" is expanded first.
        assert_eq!(shortest_next_step(&maze, pos(2, 1), pos(2, 5)), pos(1, 1));
    }

    #[test]
    fn test_unreachable_goal_stays_put() {
        let maze = Maze::parse(
            "
xxxxxxx
x..x..x
xxxxxxx
",
        )
        .unwrap();
        assert_eq!(shortest_next_step(&maze, pos(1, 1), pos(1, 5)), pos(1, 1));
        assert_eq!(path_length(&maze, pos(1, 1), pos(1, 5)), None);
        // Walls and out-of-bounds goals are unreachable too.
        assert_eq!(shortest_next_step(&maze, pos(1, 1), pos(0, 0)), pos(1, 1));
        assert_eq!(shortest_next_step(&maze, pos(1, 1), pos(-4, 9)), pos(1, 1));
    }

    #[test]
    fn test_adjacent_goal() {
        let maze = Maze::parse(CORRIDORS).unwrap();
        assert_eq!(shortest_next_step(&maze, pos(1, 1), pos(1, 2)), pos(1, 2));
    }
}
