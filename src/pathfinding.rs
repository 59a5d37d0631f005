//! Orientation-aware A* over the grid.
//!
//! Every edge costs one move plus the 90 degree turns needed to face the
//! neighbour, so the planner prefers straight runs. With the footprint margin
//! enabled, a cell is only a valid robot center if it is off the outer wall
//! ring and not next to a known obstacle.

use crate::error::SearchError;
use crate::map::Grid;
use crate::message::{Command, MAX_FORWARD_REPEAT};
use crate::orientation::{AbsoluteOrientation, Action};
use crate::types::{Cell, Position};
use log::debug;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Heuristic for cells that are not known to be clear.
pub const HEURISTIC_SENTINEL: u32 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathfinderConfig {
    pub move_cost: u32,
    pub turn_cost: u32,
    /// Keep the robot center off walls and away from obstacles
    pub footprint_margin: bool,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            move_cost: 1,
            turn_cost: 1,
            footprint_margin: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathStep {
    pub position: Position,
    /// Heading on arrival
    pub orientation: AbsoluteOrientation,
    pub g: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Path {
    pub steps: Vec<PathStep>,
    pub commands: Vec<Action>,
    pub cost: u32,
}

impl Path {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn moves(&self) -> usize {
        self.commands.iter().filter(|a| !a.is_turn()).count()
    }

    pub fn turns(&self) -> usize {
        self.commands.iter().filter(|a| a.is_turn()).count()
    }

    /// Commands with forward runs folded into `mf*N`.
    pub fn compressed(&self) -> Vec<Command> {
        let mut out = Vec::new();
        let mut run: u8 = 0;
        let flush = |run: &mut u8, out: &mut Vec<Command>| {
            match *run {
                0 => {}
                1 => out.push(Command::Move(Action::MoveForward)),
                n => out.push(Command::ForwardBy(n)),
            }
            *run = 0;
        };
        for action in &self.commands {
            if action.is_turn() {
                flush(&mut run, &mut out);
                out.push(Command::Move(*action));
            } else {
                run += 1;
                if run == MAX_FORWARD_REPEAT {
                    flush(&mut run, &mut out);
                }
            }
        }
        flush(&mut run, &mut out);
        out
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct OpenEntry {
    f: u32,
    h: u32,
    seq: u64,
    position: Position,
}

// Min-heap on (f, h, insertion order)
impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Copy, Debug)]
struct Node {
    parent: Option<Position>,
    g: u32,
    h: u32,
    orientation: AbsoluteOrientation,
    closed: bool,
}

impl Node {
    fn f(&self) -> u32 {
        self.g.saturating_add(self.h)
    }
}

pub struct AStarPathfinder {
    width: usize,
    height: usize,
    target: Position,
    /// `None` marks a cell the robot center may not occupy
    heuristic: Vec<Vec<Option<u32>>>,
    config: PathfinderConfig,
}

impl AStarPathfinder {
    pub fn new(grid: &Grid, target: Position, config: PathfinderConfig) -> Self {
        let (width, height) = (grid.width(), grid.height());
        let mut heuristic = vec![vec![None; width]; height];
        for (y, row) in grid.rows().iter().enumerate() {
            for (x, cell) in row.iter().enumerate() {
                let pos = Position::new(x as i32, y as i32);
                heuristic[y][x] = match cell {
                    Cell::Clear => Some(pos.manhattan(target)),
                    Cell::Obstacle => None,
                    _ => Some(HEURISTIC_SENTINEL),
                };
            }
        }
        if config.footprint_margin {
            for pos in grid.along_wall_positions() {
                heuristic[pos.y as usize][pos.x as usize] = None;
            }
            for (y, row) in grid.rows().iter().enumerate() {
                for (x, cell) in row.iter().enumerate() {
                    if *cell != Cell::Obstacle {
                        continue;
                    }
                    for pos in grid.surrounding_positions(Position::new(x as i32, y as i32)) {
                        heuristic[pos.y as usize][pos.x as usize] = None;
                    }
                }
            }
        }
        Self {
            width,
            height,
            target,
            heuristic,
            config,
        }
    }

    pub fn target(&self) -> Position {
        self.target
    }

    fn in_arena(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.width && (pos.y as usize) < self.height
    }

    /// Heuristic value, `None` if the cell is outside or inaccessible.
    pub fn heuristic(&self, pos: Position) -> Option<u32> {
        if !self.in_arena(pos) {
            return None;
        }
        self.heuristic[pos.y as usize][pos.x as usize]
    }

    pub fn is_accessible(&self, pos: Position) -> bool {
        self.heuristic(pos).is_some()
    }

    pub fn get_shortest_path(&self, start: Position, orientation: AbsoluteOrientation) -> Result<Path, SearchError> {
        for pos in [start, self.target] {
            if !self.in_arena(pos) {
                return Err(SearchError::OutOfArena(pos));
            }
        }
        let start_h = self.heuristic(start).ok_or(SearchError::StartInaccessible(start))?;
        if !self.is_accessible(self.target) {
            return Err(SearchError::TargetInaccessible(self.target));
        }

        let mut nodes: HashMap<Position, Node> = HashMap::new();
        let mut open = BinaryHeap::new();
        let mut seq = 0u64;
        nodes.insert(
            start,
            Node {
                parent: None,
                g: 0,
                h: start_h,
                orientation,
                closed: false,
            },
        );
        open.push(OpenEntry {
            f: start_h,
            h: start_h,
            seq,
            position: start,
        });

        while let Some(entry) = open.pop() {
            let Some(current) = nodes.get_mut(&entry.position) else {
                continue;
            };
            if current.closed || current.f() != entry.f {
                continue;
            }
            current.closed = true;
            let current = *current;
            if entry.position == self.target {
                return Ok(self.reconstruct(&nodes, start));
            }

            for heading in AbsoluteOrientation::TRAVEL_DIRECTIONS {
                let (dx, dy) = heading.to_pos_change();
                let next = entry.position.offset(dx, dy);
                let Some(h) = self.heuristic(next) else {
                    continue;
                };
                let turns = current.orientation.minimum_turns_to(heading);
                let g = current.g + self.config.move_cost + turns * self.config.turn_cost;
                let candidate = Node {
                    parent: Some(entry.position),
                    g,
                    h,
                    orientation: heading,
                    closed: false,
                };
                match nodes.get_mut(&next) {
                    None => {
                        nodes.insert(next, candidate);
                    }
                    // A cheaper route re-opens a closed node so its successors are relaxed again
                    Some(seen) if candidate.f() < seen.f() => {
                        if seen.closed {
                            debug!("reopening {next} at g={g}");
                        }
                        *seen = candidate;
                    }
                    Some(_) => continue,
                }
                seq += 1;
                open.push(OpenEntry {
                    f: candidate.f(),
                    h,
                    seq,
                    position: next,
                });
            }
        }

        debug!("no path from {start} to {}", self.target);
        Err(SearchError::Unreachable {
            start,
            target: self.target,
        })
    }

    fn reconstruct(&self, nodes: &HashMap<Position, Node>, start: Position) -> Path {
        let mut steps = Vec::new();
        let mut cursor = Some(self.target);
        while let Some(pos) = cursor {
            let Some(node) = nodes.get(&pos) else {
                break;
            };
            steps.push(PathStep {
                position: pos,
                orientation: node.orientation,
                g: node.g,
            });
            if pos == start {
                break;
            }
            cursor = node.parent;
        }
        steps.reverse();

        let mut commands = Vec::new();
        for pair in steps.windows(2) {
            let heading = AbsoluteOrientation::between(pair[0].position, pair[1].position).unwrap_or(pair[1].orientation);
            commands.extend(pair[0].orientation.turn_actions_to(heading));
            commands.push(Action::MoveForward);
        }
        let cost = steps.last().map_or(0, |s| s.g);
        Path { steps, commands, cost }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArenaConfig;
    use crate::map::OverwritePolicy;
    use AbsoluteOrientation::*;

    fn open_grid(width: usize, height: usize) -> Grid {
        let mut grid = Grid::new(width, height, Position::new(1, 1), Position::new(1, 1));
        let all: Vec<Position> = (0..height as i32)
            .flat_map(|y| (0..width as i32).map(move |x| Position::new(x, y)))
            .collect();
        grid.set_cell_list(&all, Cell::Clear, OverwritePolicy::OVERWRITE_ALL);
        grid
    }

    fn point_robot() -> PathfinderConfig {
        PathfinderConfig {
            footprint_margin: false,
            ..PathfinderConfig::default()
        }
    }

    #[test]
    fn corner_to_corner_on_three_by_three() {
        let grid = open_grid(3, 3);
        let finder = AStarPathfinder::new(&grid, Position::new(2, 2), point_robot());
        let path = finder.get_shortest_path(Position::new(0, 0), East).unwrap();
        assert_eq!(path.moves(), 4);
        assert!(path.turns() <= 2);
        assert_eq!(path.cost as usize, 4 + path.turns());
        assert_eq!(path.steps.first().map(|s| s.position), Some(Position::new(0, 0)));
        assert_eq!(path.steps.last().map(|s| s.position), Some(Position::new(2, 2)));
    }

    #[test]
    fn reversal_is_two_right_turns() {
        let grid = open_grid(5, 1);
        let finder = AStarPathfinder::new(&grid, Position::new(0, 0), point_robot());
        let path = finder.get_shortest_path(Position::new(3, 0), East).unwrap();
        assert_eq!(
            path.commands,
            vec![
                Action::TurnRight,
                Action::TurnRight,
                Action::MoveForward,
                Action::MoveForward,
                Action::MoveForward
            ]
        );
        assert_eq!(path.cost, 5);
    }

    #[test]
    fn start_to_goal_on_empty_arena() {
        let arena = ArenaConfig::default();
        let mut grid = Grid::from_config(&arena);
        let all: Vec<Position> = (0..20).flat_map(|y| (0..15).map(move |x| Position::new(x, y))).collect();
        grid.set_cell_list(&all, Cell::Clear, OverwritePolicy::OVERWRITE_ALL);
        let finder = AStarPathfinder::new(&grid, arena.end_center, PathfinderConfig::default());
        let path = finder.get_shortest_path(arena.start_center, East).unwrap();
        assert_eq!(path.moves(), 12 + 17);
        assert_eq!(path.turns(), 1);
        assert!(path.steps.windows(2).all(|w| w[0].g <= w[1].g));
        // wall ring is never entered
        assert!(path.steps.iter().all(|s| s.position.x >= 1 && s.position.y >= 1));
    }

    #[test]
    fn obstacles_keep_a_margin() {
        let mut grid = open_grid(7, 7);
        grid.set_cell(Position::new(3, 2), Cell::Obstacle);
        let finder = AStarPathfinder::new(&grid, Position::new(5, 3), PathfinderConfig::default());
        assert!(!finder.is_accessible(Position::new(3, 3)));
        assert!(!finder.is_accessible(Position::new(0, 3)));
        let path = finder.get_shortest_path(Position::new(1, 3), East).unwrap();
        assert!(path.steps.iter().all(|s| finder.is_accessible(s.position)));
        assert!(path.steps.iter().any(|s| s.position.y == 4));
    }

    #[test]
    fn failures_are_explicit() {
        let mut grid = open_grid(7, 7);
        let finder = AStarPathfinder::new(&grid, Position::new(5, 5), PathfinderConfig::default());
        assert_eq!(
            finder.get_shortest_path(Position::new(9, 1), North),
            Err(SearchError::OutOfArena(Position::new(9, 1)))
        );
        assert_eq!(
            finder.get_shortest_path(Position::new(0, 3), North),
            Err(SearchError::StartInaccessible(Position::new(0, 3)))
        );

        // a wall of obstacles across column 3 cuts the arena in two
        for y in 0..7 {
            grid.set_cell(Position::new(3, y), Cell::Obstacle);
        }
        let finder = AStarPathfinder::new(&grid, Position::new(5, 3), point_robot());
        assert_eq!(
            finder.get_shortest_path(Position::new(1, 3), North),
            Err(SearchError::Unreachable {
                start: Position::new(1, 3),
                target: Position::new(5, 3)
            })
        );
        let finder = AStarPathfinder::new(&grid, Position::new(3, 3), point_robot());
        assert_eq!(
            finder.get_shortest_path(Position::new(1, 3), North),
            Err(SearchError::TargetInaccessible(Position::new(3, 3)))
        );
    }

    #[test]
    fn cheaper_route_through_unknown_cells_reopens_closed_nodes() {
        use Cell::{Clear as C, Obstacle as X, Unknown as U};
        // (2,0) is first closed through the clear detour along row 1, then
        // reached more cheaply through the unknown cell (1,0)
        let mut rows = vec![vec![C, U, C, U, C], vec![C, C, C, X, X], vec![X; 5]];
        rows.extend(vec![vec![C; 5]; 3]);
        let grid = Grid::with_cells(rows, Position::new(1, 4), Position::new(1, 4)).unwrap();
        let finder = AStarPathfinder::new(&grid, Position::new(4, 0), point_robot());
        let path = finder.get_shortest_path(Position::new(0, 0), East).unwrap();
        assert_eq!(path.commands, vec![Action::MoveForward; 4]);
        assert_eq!(path.cost, 4);
        let costs: Vec<u32> = path.steps.iter().map(|s| s.g).collect();
        assert_eq!(costs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn already_there() {
        let grid = open_grid(3, 3);
        let finder = AStarPathfinder::new(&grid, Position::new(1, 1), point_robot());
        let path = finder.get_shortest_path(Position::new(1, 1), West).unwrap();
        assert!(path.is_empty());
        assert_eq!(path.cost, 0);
        assert_eq!(path.steps.len(), 1);
    }

    #[test]
    fn compression_folds_forward_runs() {
        let mut commands = vec![Action::MoveForward; 23];
        commands.insert(0, Action::TurnLeft);
        commands.push(Action::TurnRight);
        commands.push(Action::MoveForward);
        let path = Path {
            steps: Vec::new(),
            commands,
            cost: 0,
        };
        assert_eq!(
            path.compressed(),
            vec![
                Command::Move(Action::TurnLeft),
                Command::ForwardBy(20),
                Command::ForwardBy(3),
                Command::Move(Action::TurnRight),
                Command::Move(Action::MoveForward),
            ]
        );
    }
}
