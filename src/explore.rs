//! Right-hand wall-following exploration.
//!
//! Each call looks at up to three candidate actions in precedence order and
//! picks the first one whose resulting heading is not blocked two cells
//! ahead. The precedence list rotates after each pick so the robot keeps a
//! wall on its right.

use crate::map::Grid;
use crate::orientation::{AbsoluteOrientation, Action};
use crate::robot::Robot;
use crate::types::{Cell, Position};
use log::trace;

/// How passable the strip two cells ahead of the robot is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessStatus {
    CanAccess,
    Unsure,
    CannotAccess,
}

const DEFAULT_PRECEDENCE: [Action; 3] = [Action::TurnRight, Action::MoveForward, Action::TurnLeft];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MazeExplorer {
    precedence: [Action; 3],
}

impl Default for MazeExplorer {
    fn default() -> Self {
        Self {
            precedence: DEFAULT_PRECEDENCE,
        }
    }
}

impl MazeExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn precedence(&self) -> [Action; 3] {
        self.precedence
    }

    pub fn reset(&mut self) {
        self.precedence = DEFAULT_PRECEDENCE;
    }

    /// Classify the three cells two steps ahead of `center` along `heading`.
    pub fn check_status(grid: &Grid, center: Position, heading: AbsoluteOrientation) -> AccessStatus {
        let (dx, dy) = heading.to_pos_change();
        let ahead = center.offset(2 * dx, 2 * dy);
        let mut status = AccessStatus::CanAccess;
        for k in -1..=1 {
            match grid.get_cell(ahead.offset(-dy * k, dx * k)) {
                None | Some(Cell::Obstacle) => return AccessStatus::CannotAccess,
                Some(Cell::Unknown) => status = AccessStatus::Unsure,
                Some(_) => {}
            }
        }
        status
    }

    /// Next action, or `None` when every candidate is blocked.
    pub fn get_next_move(&mut self, grid: &Grid, robot: &Robot) -> Option<Action> {
        let candidates = self.precedence;
        for action in candidates {
            let heading = robot.orientation().if_applied(action);
            let status = Self::check_status(grid, robot.position(), heading);
            trace!("{action} towards {heading}: {status:?}");
            if status == AccessStatus::CannotAccess {
                continue;
            }
            self.precedence = match action {
                Action::TurnRight | Action::TurnLeft => {
                    [Action::MoveForward, Action::TurnLeft, Action::TurnRight]
                }
                _ => DEFAULT_PRECEDENCE,
            };
            return Some(action);
        }
        None
    }
}
