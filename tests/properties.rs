use mazerunner::config::ArenaConfig;
use mazerunner::explore::{AccessStatus, MazeExplorer};
use mazerunner::map::{Grid, OverwritePolicy};
use mazerunner::orientation::{AbsoluteOrientation, Action};
use mazerunner::pathfinding::{AStarPathfinder, PathfinderConfig};
use mazerunner::robot::Robot;
use mazerunner::types::{Cell, Position};
use mazerunner::world::{SensePolicy, World};
use proptest::prelude::*;
use proptest::sample::select;

const SIDE: usize = 7;

fn cell_of(code: u8) -> Cell {
    match code {
        0 => Cell::Clear,
        1 => Cell::Obstacle,
        _ => Cell::Unknown,
    }
}

/// SIDE x SIDE grid with no pinned zones.
fn grid_of(codes: &[u8]) -> Grid {
    let rows: Vec<Vec<Cell>> = codes
        .chunks(SIDE)
        .map(|row| row.iter().map(|c| cell_of(*c)).collect::<Vec<Cell>>())
        .collect();
    Grid::with_cells(rows, Position::new(-5, -5), Position::new(-5, -5)).unwrap()
}

fn codes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..3, SIDE * SIDE)
}

fn travel() -> impl Strategy<Value = AbsoluteOrientation> {
    select(AbsoluteOrientation::TRAVEL_DIRECTIONS.to_vec())
}

/// The three cells across the heading, two steps ahead.
fn inspected(center: Position, heading: AbsoluteOrientation) -> Vec<Position> {
    let (dx, dy) = heading.to_pos_change();
    let ahead = center.offset(2 * dx, 2 * dy);
    if dx == 0 {
        (-1..=1).map(|k| ahead.offset(k, 0)).collect()
    } else {
        (-1..=1).map(|k| ahead.offset(0, k)).collect()
    }
}

proptest! {
    #[test]
    fn turns_compose(value in 0i32..8) {
        let o = AbsoluteOrientation::from_value(value);
        prop_assert_eq!(o.turn_left().turn_right(), o);
        prop_assert_eq!(o.turn_right().turn_right().turn_right().turn_right(), o);
        prop_assert_eq!(o.turn_back().turn_back(), o);
        prop_assert_eq!(o.turn_right().turn_right(), o.turn_back());
    }

    #[test]
    fn access_status_follows_inspected_cells(
        codes in codes(),
        x in -1i32..8,
        y in -1i32..8,
        heading in travel(),
    ) {
        let grid = grid_of(&codes);
        let center = Position::new(x, y);
        let cells: Vec<Option<Cell>> = inspected(center, heading).into_iter().map(|p| grid.get_cell(p)).collect();
        let status = MazeExplorer::check_status(&grid, center, heading);

        let blocked = cells.iter().any(|c| matches!(c, None | Some(Cell::Obstacle)));
        prop_assert_eq!(status == AccessStatus::CannotAccess, blocked);
        if cells.contains(&Some(Cell::Unknown)) {
            prop_assert_ne!(status, AccessStatus::CanAccess);
        }
    }

    #[test]
    fn explorer_never_picks_a_blocked_heading(
        codes in codes(),
        x in 0i32..7,
        y in 0i32..7,
        heading in travel(),
    ) {
        let grid = grid_of(&codes);
        let mut robot = Robot::new(Position::new(x, y), heading);
        let mut explorer = MazeExplorer::new();
        for _ in 0..4 {
            let Some(action) = explorer.get_next_move(&grid, &robot) else {
                break;
            };
            let facing = robot.orientation().if_applied(action);
            prop_assert_ne!(
                MazeExplorer::check_status(&grid, robot.position(), facing),
                AccessStatus::CannotAccess
            );
            // only turns keep the robot on the generated cells
            if action == Action::MoveForward {
                break;
            }
            robot.execute(action);
        }
    }

    #[test]
    fn open_grid_paths_are_manhattan(
        width in 1usize..10,
        height in 1usize..10,
        picks in (0usize..100, 0usize..100, 0usize..100, 0usize..100),
        facing in travel(),
    ) {
        let mut grid = Grid::new(width, height, Position::new(-5, -5), Position::new(-5, -5));
        let all: Vec<Position> = (0..height as i32)
            .flat_map(|y| (0..width as i32).map(move |x| Position::new(x, y)))
            .collect();
        grid.set_cell_list(&all, Cell::Clear, OverwritePolicy::OVERWRITE_ALL);
        let start = Position::new((picks.0 % width) as i32, (picks.1 % height) as i32);
        let target = Position::new((picks.2 % width) as i32, (picks.3 % height) as i32);

        let config = PathfinderConfig { footprint_margin: false, ..PathfinderConfig::default() };
        let path = AStarPathfinder::new(&grid, target, config)
            .get_shortest_path(start, facing)
            .unwrap();

        prop_assert_eq!(path.moves() as u32, start.manhattan(target));
        prop_assert_eq!(path.moves(), path.steps.len() - 1);
        prop_assert!(path.steps.windows(2).all(|w| w[0].g <= w[1].g));
        prop_assert!(path.turns() <= 3);
        prop_assert_eq!(path.cost, (path.moves() + path.turns()) as u32);
    }

    #[test]
    fn fixed_cells_never_change(
        writes in prop::collection::vec((0i32..SIDE as i32, 0i32..SIDE as i32, 0u8..3), 0..60),
        pinned in prop::collection::vec((0i32..SIDE as i32, 0i32..SIDE as i32), 1..10),
    ) {
        let mut grid = grid_of(&[2; SIDE * SIDE]);
        let pinned: Vec<Position> = pinned.into_iter().map(Position::from).collect();
        grid.set_fixed_cells(&pinned, Cell::Clear);
        for (x, y, code) in writes {
            let pos = Position::new(x, y);
            grid.set_cell(pos, cell_of(code));
            grid.set_cell_list(&[pos], cell_of(code), OverwritePolicy::OVERWRITE_ALL);
        }
        for pos in pinned {
            prop_assert!(grid.is_fixed(pos));
            prop_assert_eq!(grid.get_cell(pos), Some(Cell::Clear));
        }
    }

    #[test]
    fn sensing_reproduces_the_readings(
        obstacles in prop::collection::vec((0i32..15, 0i32..20), 0..40),
        x in 1i32..14,
        y in 1i32..19,
        heading in travel(),
    ) {
        let arena = ArenaConfig::default();
        let position = Position::new(x, y);
        let mut truth = Grid::from_config(&arena);
        let all: Vec<Position> = (0..20)
            .flat_map(|y| (0..15).map(move |x| Position::new(x, y)))
            .collect();
        truth.set_cell_list(&all, Cell::Clear, OverwritePolicy::OVERWRITE_ALL);
        for (ox, oy) in obstacles {
            truth.set_cell(Position::new(ox, oy), Cell::Obstacle);
        }
        let robot = Robot::new(position, heading);
        for pos in robot.footprint() {
            truth.set_cell(pos, Cell::Clear);
        }
        let readings = robot.sensor_readings(&truth);

        let mut world = World::new(&arena);
        world.robot.set_pose(position, Some(heading));
        let sensed = world.sense(&readings, SensePolicy::default());

        prop_assert_eq!(world.robot.sensor_readings(&world.grid), readings);
        for pos in sensed.obstacles.iter().filter(|p| !truth.is_out_of_arena(**p)) {
            prop_assert_eq!(truth.get_cell(*pos), Some(Cell::Obstacle));
        }
        for pos in sensed.clear.iter().filter(|p| !truth.is_out_of_arena(**p)) {
            prop_assert_ne!(truth.get_cell(*pos), Some(Cell::Obstacle));
        }
    }
}
