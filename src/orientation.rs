//! Absolute and relative orientation arithmetic on an 8-slot compass ring.
//!
//! ```text
//!   0 NW   1 N   2 NE
//!   7 W    .     3 E
//!   6 SW   5 S   4 SE
//! ```
//!
//! Only N, E, S and W are travel directions; the diagonal slots locate the
//! corner sensors of the robot body.

use crate::types::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the eight compass slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbsoluteOrientation {
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
}

const RING: [AbsoluteOrientation; 8] = [
    AbsoluteOrientation::NorthWest,
    AbsoluteOrientation::North,
    AbsoluteOrientation::NorthEast,
    AbsoluteOrientation::East,
    AbsoluteOrientation::SouthEast,
    AbsoluteOrientation::South,
    AbsoluteOrientation::SouthWest,
    AbsoluteOrientation::West,
];

impl AbsoluteOrientation {
    pub const TRAVEL_DIRECTIONS: [AbsoluteOrientation; 4] = [
        AbsoluteOrientation::North,
        AbsoluteOrientation::East,
        AbsoluteOrientation::South,
        AbsoluteOrientation::West,
    ];

    /// Slot index on the ring (0..8).
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Slot for any integer, wrapped onto the ring.
    pub fn from_value(value: i32) -> Self {
        RING[value.rem_euclid(8) as usize]
    }

    /// Unit position delta of this slot.
    pub const fn to_pos_change(self) -> (i32, i32) {
        match self {
            AbsoluteOrientation::NorthWest => (-1, -1),
            AbsoluteOrientation::North => (0, -1),
            AbsoluteOrientation::NorthEast => (1, -1),
            AbsoluteOrientation::East => (1, 0),
            AbsoluteOrientation::SouthEast => (1, 1),
            AbsoluteOrientation::South => (0, 1),
            AbsoluteOrientation::SouthWest => (-1, 1),
            AbsoluteOrientation::West => (-1, 0),
        }
    }

    pub fn rotate(self, steps: i32) -> Self {
        Self::from_value(self.value() as i32 + steps)
    }

    pub fn turn_left(self) -> Self {
        self.rotate(-2)
    }

    pub fn turn_right(self) -> Self {
        self.rotate(2)
    }

    pub fn turn_back(self) -> Self {
        self.rotate(4)
    }

    /// Orientation after executing `action`.
    pub fn if_applied(self, action: Action) -> Self {
        match action {
            Action::MoveForward => self,
            Action::TurnLeft => self.turn_left(),
            Action::TurnRight => self.turn_right(),
            Action::TurnBack => self.turn_back(),
        }
    }

    /// Number of 90 degree turns needed to face `target` (0, 1 or 2).
    pub fn minimum_turns_to(self, target: AbsoluteOrientation) -> u32 {
        let diff = (target.value() as i32 - self.value() as i32).rem_euclid(8);
        (diff.min(8 - diff) / 2) as u32
    }

    /// Turn commands rotating `self` onto `target`; a reversal is two right turns.
    pub fn turn_actions_to(self, target: AbsoluteOrientation) -> Vec<Action> {
        match (target.value() as i32 - self.value() as i32).rem_euclid(8) {
            2 => vec![Action::TurnRight],
            6 => vec![Action::TurnLeft],
            4 => vec![Action::TurnRight, Action::TurnRight],
            _ => Vec::new(),
        }
    }

    /// Heading that leads from `from` to the 4-connected neighbour `to`.
    pub fn between(from: Position, to: Position) -> Option<Self> {
        match (to.x - from.x, to.y - from.y) {
            (0, -1) => Some(AbsoluteOrientation::North),
            (1, 0) => Some(AbsoluteOrientation::East),
            (0, 1) => Some(AbsoluteOrientation::South),
            (-1, 0) => Some(AbsoluteOrientation::West),
            _ => None,
        }
    }

    pub const fn is_travel_direction(self) -> bool {
        self.value() % 2 == 1
    }

    pub const fn name(self) -> &'static str {
        match self {
            AbsoluteOrientation::NorthWest => "north-west",
            AbsoluteOrientation::North => "north",
            AbsoluteOrientation::NorthEast => "north-east",
            AbsoluteOrientation::East => "east",
            AbsoluteOrientation::SouthEast => "south-east",
            AbsoluteOrientation::South => "south",
            AbsoluteOrientation::SouthWest => "south-west",
            AbsoluteOrientation::West => "west",
        }
    }
}

impl fmt::Display for AbsoluteOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A slot expressed relative to a reference heading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelativeOrientation {
    Front,
    FrontLeft,
    FrontRight,
    Left,
    Right,
    BackLeft,
    BackRight,
    Back,
}

impl RelativeOrientation {
    const fn ring_offset(self) -> i32 {
        match self {
            RelativeOrientation::Front => 0,
            RelativeOrientation::FrontLeft => -1,
            RelativeOrientation::FrontRight => 1,
            RelativeOrientation::Left => -2,
            RelativeOrientation::Right => 2,
            RelativeOrientation::BackLeft => -3,
            RelativeOrientation::BackRight => 3,
            RelativeOrientation::Back => 4,
        }
    }

    /// Absolute slot for this relative one. With `front_major`, the two
    /// front corners resolve to the front heading itself.
    pub fn resolve(self, heading: AbsoluteOrientation, front_major: bool) -> AbsoluteOrientation {
        let offset = match self {
            RelativeOrientation::FrontLeft | RelativeOrientation::FrontRight if front_major => 0,
            other => other.ring_offset(),
        };
        heading.rotate(offset)
    }

    /// Position delta of this slot from the robot center.
    pub fn to_pos_change(self, heading: AbsoluteOrientation) -> (i32, i32) {
        heading.rotate(self.ring_offset()).to_pos_change()
    }
}

/// A single discrete robot motion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    MoveForward,
    TurnLeft,
    TurnRight,
    TurnBack,
}

impl Action {
    pub const fn token(self) -> &'static str {
        match self {
            Action::MoveForward => "mf",
            Action::TurnLeft => "tl",
            Action::TurnRight => "tr",
            Action::TurnBack => "tb",
        }
    }

    pub fn from_token(token: &str) -> Option<Action> {
        match token {
            "mf" => Some(Action::MoveForward),
            "tl" => Some(Action::TurnLeft),
            "tr" => Some(Action::TurnRight),
            "tb" => Some(Action::TurnBack),
            _ => None,
        }
    }

    pub const fn is_turn(self) -> bool {
        !matches!(self, Action::MoveForward)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AbsoluteOrientation::*;

    #[test]
    fn turns_move_two_slots() {
        assert_eq!(North.turn_right(), East);
        assert_eq!(North.turn_left(), West);
        assert_eq!(East.turn_back(), West);
        assert_eq!(NorthWest.turn_left(), SouthWest);
    }

    #[test]
    fn left_then_right_is_identity() {
        for value in 0..8 {
            let o = AbsoluteOrientation::from_value(value);
            assert_eq!(o.turn_left().turn_right(), o);
            assert_eq!(o.turn_right().turn_right().turn_right().turn_right(), o);
        }
    }

    #[test]
    fn minimum_turns_between_headings() {
        assert_eq!(North.minimum_turns_to(North), 0);
        assert_eq!(North.minimum_turns_to(East), 1);
        assert_eq!(North.minimum_turns_to(West), 1);
        assert_eq!(North.minimum_turns_to(South), 2);
        assert_eq!(East.minimum_turns_to(West), 2);
    }

    #[test]
    fn turn_actions_match_minimum_turns() {
        assert!(East.turn_actions_to(East).is_empty());
        assert_eq!(East.turn_actions_to(South), vec![Action::TurnRight]);
        assert_eq!(East.turn_actions_to(North), vec![Action::TurnLeft]);
        assert_eq!(
            East.turn_actions_to(West),
            vec![Action::TurnRight, Action::TurnRight]
        );
    }

    #[test]
    fn heading_between_neighbours() {
        let origin = Position::new(4, 4);
        assert_eq!(AbsoluteOrientation::between(origin, origin.offset(0, -1)), Some(North));
        assert_eq!(AbsoluteOrientation::between(origin, origin.offset(-1, 0)), Some(West));
        assert_eq!(AbsoluteOrientation::between(origin, origin.offset(1, 1)), None);
    }

    #[test]
    fn relative_slots_resolve_against_heading() {
        assert_eq!(RelativeOrientation::Left.resolve(East, true), North);
        assert_eq!(RelativeOrientation::Right.resolve(East, true), South);
        assert_eq!(RelativeOrientation::FrontLeft.resolve(East, true), East);
        assert_eq!(RelativeOrientation::FrontLeft.resolve(East, false), NorthEast);
        assert_eq!(RelativeOrientation::FrontLeft.to_pos_change(East), (1, -1));
        assert_eq!(RelativeOrientation::FrontRight.to_pos_change(North), (1, -1));
        assert_eq!(RelativeOrientation::Back.to_pos_change(South), (0, -1));
    }

    #[test]
    fn action_tokens() {
        for action in [Action::MoveForward, Action::TurnLeft, Action::TurnRight, Action::TurnBack] {
            assert_eq!(Action::from_token(action.token()), Some(action));
        }
        assert!(!Action::MoveForward.is_turn());
        assert!(Action::TurnBack.is_turn());
    }
}
