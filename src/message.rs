//! # Message Protocol Module
//!
//! Typed command and telemetry messages exchanged between the controller and
//! the external devices.
//!
//! ## Wire Format
//!
//! Every message travels as one JSON object:
//!
//! ```text
//! {"type": "cmd", "msg": "mf*3"}
//! {"type": "mapupdate", "msg": "1,-1,0,3,-1"}
//! {"type": "curexplorecoverage", "msg": 42}
//! ```
//!
//! `Message` is a closed sum type; the only way to build one from untrusted
//! input is [`Message::from_json`] / [`Message::parse`], which validate the
//! payload for the given type and fail with [`ValidationError`].

use crate::error::ValidationError;
use crate::orientation::{AbsoluteOrientation, Action};
use crate::robot::SENSORS;
use crate::types::{Cell, CellChange, Phase, Position};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Number of distance sensors reported by a `mapupdate`.
pub const SENSOR_COUNT: usize = 5;

/// Sensor value meaning "no obstacle within range".
pub const NOTHING_DETECTED: i32 = -1;

/// Upper bound of the `mf*N` repeat count.
pub const MAX_FORWARD_REPEAT: u8 = 20;

/// Commands understood by the sensor/actuator device.
///
/// # Examples
///
/// ```rust
/// use mazerunner::message::Command;
/// use mazerunner::orientation::Action;
///
/// let cmd: Command = "mf*3".parse().unwrap();
/// assert_eq!(cmd, Command::ForwardBy(3));
/// assert_eq!(cmd.actions(), vec![Action::MoveForward; 3]);
/// assert_eq!(cmd.to_string(), "mf*3");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Single move or turn (`mf`, `tl`, `tr`, `tb`)
    Move(Action),
    /// Repeated move forward (`mf*N`, N in 1..=20)
    ForwardBy(u8),
    /// Ask the device for a fresh sensor reading (`sr`)
    SensorRequest,
    Explore,
    EndExplore,
    /// Start the fast run (`run`)
    FastRun,
    Reset,
    Calibrate,
    Sense,
}

impl Command {
    /// Motion commands change the robot pose and are acknowledged by `robotmove`.
    pub const fn is_motion(&self) -> bool {
        matches!(self, Command::Move(_) | Command::ForwardBy(_))
    }

    /// Discrete actions this command expands to.
    pub fn actions(&self) -> Vec<Action> {
        match self {
            Command::Move(action) => vec![*action],
            Command::ForwardBy(count) => vec![Action::MoveForward; *count as usize],
            _ => Vec::new(),
        }
    }
}

impl FromStr for Command {
    type Err = ValidationError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        if let Some(action) = Action::from_token(token) {
            return Ok(Command::Move(action));
        }
        if let Some(count) = token.strip_prefix("mf*") {
            let count: u8 = count
                .parse()
                .map_err(|_| ValidationError::payload("cmd", token, "repeat count is not a number"))?;
            if count == 0 || count > MAX_FORWARD_REPEAT {
                return Err(ValidationError::payload(
                    "cmd",
                    token,
                    format!("repeat count must be within 1..={MAX_FORWARD_REPEAT}"),
                ));
            }
            return Ok(Command::ForwardBy(count));
        }
        match token {
            "sr" => Ok(Command::SensorRequest),
            "explore" => Ok(Command::Explore),
            "endexplore" => Ok(Command::EndExplore),
            "run" => Ok(Command::FastRun),
            "reset" => Ok(Command::Reset),
            "calibrate" => Ok(Command::Calibrate),
            "sense" => Ok(Command::Sense),
            _ => Err(ValidationError::payload("cmd", token, "unknown command")),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Move(action) => f.write_str(action.token()),
            Command::ForwardBy(count) => write!(f, "mf*{count}"),
            Command::SensorRequest => f.write_str("sr"),
            Command::Explore => f.write_str("explore"),
            Command::EndExplore => f.write_str("endexplore"),
            Command::FastRun => f.write_str("run"),
            Command::Reset => f.write_str("reset"),
            Command::Calibrate => f.write_str("calibrate"),
            Command::Sense => f.write_str("sense"),
        }
    }
}

/// The five distance readings of one `mapupdate`, in sensor order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SensorReadings([i32; SENSOR_COUNT]);

impl SensorReadings {
    /// Each value must be -1 or a distance within its sensor's range.
    pub fn new(values: [i32; SENSOR_COUNT]) -> Result<Self, ValidationError> {
        if let Some(bad) = values.iter().find(|v| **v < NOTHING_DETECTED) {
            return Err(ValidationError::payload(
                "mapupdate",
                bad.to_string(),
                "readings must be -1 or a distance",
            ));
        }
        for (value, sensor) in values.iter().zip(SENSORS.iter()) {
            if i64::from(*value) > i64::from(sensor.range) {
                return Err(ValidationError::payload(
                    "mapupdate",
                    value.to_string(),
                    format!("{:?} sensor reads at most {}", sensor.slot, sensor.range),
                ));
            }
        }
        Ok(Self(values))
    }

    /// Caller guarantees every value is -1 or a distance within range.
    pub(crate) const fn from_valid(values: [i32; SENSOR_COUNT]) -> Self {
        Self(values)
    }

    /// Reading of sensor `index`, `None` when nothing was detected.
    pub fn distance(&self, index: usize) -> Option<u32> {
        self.0
            .get(index)
            .filter(|v| **v != NOTHING_DETECTED)
            .map(|v| *v as u32)
    }

    pub fn values(&self) -> &[i32; SENSOR_COUNT] {
        &self.0
    }
}

impl FromStr for SensorReadings {
    type Err = ValidationError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = payload.split(',').map(str::trim).collect();
        if parts.len() != SENSOR_COUNT {
            return Err(ValidationError::payload(
                "mapupdate",
                payload,
                format!("expected {SENSOR_COUNT} readings, got {}", parts.len()),
            ));
        }
        let mut values = [NOTHING_DETECTED; SENSOR_COUNT];
        for (slot, part) in values.iter_mut().zip(parts) {
            *slot = part
                .parse()
                .map_err(|_| ValidationError::payload("mapupdate", payload, "reading is not an integer"))?;
        }
        Self::new(values)
    }
}

impl fmt::Display for SensorReadings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(i32::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

/// Every message the controller can receive or emit.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Command(Command),
    /// Acknowledgement of an executed motion command
    RobotMove(Command),
    MapUpdate(SensorReadings),
    StateChange(Phase),
    /// Explored percentage, floored
    ExploreCoverage(u32),
    /// Seconds left in the exploration budget
    ExploreRemainingTime(u32),
    SetExploreTimeLimit(u32),
    SetExploreCoverage(u32),
    SetRobotPosition(Position, Option<AbsoluteOrientation>),
    LoadMap(String),
    /// Cells changed by the latest sensor fusion
    MapStatus(Vec<CellChange>),
}

/// Raw `{"type", "msg"}` frame as found on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub msg: Value,
}

impl Message {
    /// Wire `type` string of this message.
    pub const fn kind(&self) -> &'static str {
        match self {
            Message::Command(_) => "cmd",
            Message::RobotMove(_) => "robotmove",
            Message::MapUpdate(_) => "mapupdate",
            Message::StateChange(_) => "stchange",
            Message::ExploreCoverage(_) => "curexplorecoverage",
            Message::ExploreRemainingTime(_) => "exploreremainingtime",
            Message::SetExploreTimeLimit(_) => "setexploretime",
            Message::SetExploreCoverage(_) => "setexplorecoverage",
            Message::SetRobotPosition(..) => "setrobotpos",
            Message::LoadMap(_) => "loadmap",
            Message::MapStatus(_) => "mapstatus",
        }
    }

    /// Validating factory: builds a message from a wire type and payload text.
    pub fn parse(kind: &str, payload: &str) -> Result<Self, ValidationError> {
        match kind {
            "cmd" => Ok(Message::Command(payload.parse()?)),
            "robotmove" => {
                let command: Command = payload.parse()?;
                if !command.is_motion() {
                    return Err(ValidationError::payload(
                        "robotmove",
                        payload,
                        "not a motion command",
                    ));
                }
                Ok(Message::RobotMove(command))
            }
            "mapupdate" => Ok(Message::MapUpdate(payload.parse()?)),
            "stchange" => Phase::from_wire_name(payload.trim())
                .map(Message::StateChange)
                .ok_or_else(|| ValidationError::payload("stchange", payload, "unknown phase")),
            "curexplorecoverage" => {
                parse_bounded("curexplorecoverage", payload, 0, 100).map(Message::ExploreCoverage)
            }
            "exploreremainingtime" => {
                parse_bounded("exploreremainingtime", payload, 0, u32::MAX).map(Message::ExploreRemainingTime)
            }
            "setexploretime" => {
                parse_bounded("setexploretime", payload, 1, u32::MAX).map(Message::SetExploreTimeLimit)
            }
            "setexplorecoverage" => {
                parse_bounded("setexplorecoverage", payload, 1, 100).map(Message::SetExploreCoverage)
            }
            "setrobotpos" => parse_robot_position(payload),
            "loadmap" => {
                let path = payload.trim();
                if path.is_empty() {
                    return Err(ValidationError::payload("loadmap", payload, "empty path"));
                }
                Ok(Message::LoadMap(path.to_string()))
            }
            "mapstatus" => parse_map_status(payload).map(Message::MapStatus),
            other => Err(ValidationError::UnknownType(other.to_string())),
        }
    }

    /// Payload text as carried in the `msg` field.
    pub fn payload(&self) -> String {
        match self {
            Message::Command(cmd) | Message::RobotMove(cmd) => cmd.to_string(),
            Message::MapUpdate(readings) => readings.to_string(),
            Message::StateChange(phase) => phase.wire_name().to_string(),
            Message::ExploreCoverage(v)
            | Message::ExploreRemainingTime(v)
            | Message::SetExploreTimeLimit(v)
            | Message::SetExploreCoverage(v) => v.to_string(),
            Message::SetRobotPosition(pos, None) => pos.to_string(),
            Message::SetRobotPosition(pos, Some(o)) => format!("{pos},{}", o.value()),
            Message::LoadMap(path) => path.clone(),
            Message::MapStatus(changes) => {
                let parts: Vec<String> = changes.iter().map(CellChange::to_string).collect();
                parts.join("|")
            }
        }
    }

    pub fn to_raw(&self) -> RawMessage {
        let msg = match self {
            Message::ExploreCoverage(v)
            | Message::ExploreRemainingTime(v)
            | Message::SetExploreTimeLimit(v)
            | Message::SetExploreCoverage(v) => Value::from(*v),
            other => Value::String(other.payload()),
        };
        RawMessage {
            kind: self.kind().to_string(),
            msg,
        }
    }

    pub fn from_raw(raw: &RawMessage) -> Result<Self, ValidationError> {
        let payload = match &raw.msg {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(ValidationError::payload(
                    "msg",
                    other.to_string(),
                    "payload must be a string or a number",
                ));
            }
        };
        Self::parse(&raw.kind, &payload)
    }

    /// Parse one JSON frame.
    ///
    /// ```rust
    /// use mazerunner::message::{Command, Message};
    ///
    /// let msg = Message::from_json(r#"{"type": "cmd", "msg": "explore"}"#).unwrap();
    /// assert_eq!(msg, Message::Command(Command::Explore));
    /// assert!(Message::from_json(r#"{"type": "cmd", "msg": "fly"}"#).is_err());
    /// ```
    pub fn from_json(frame: &str) -> Result<Self, ValidationError> {
        let raw: RawMessage =
            serde_json::from_str(frame).map_err(|e| ValidationError::MalformedFrame(e.to_string()))?;
        Self::from_raw(&raw)
    }

    pub fn to_json(&self) -> String {
        // RawMessage only holds strings and numbers
        serde_json::to_string(&self.to_raw()).unwrap_or_default()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.payload())
    }
}

fn parse_bounded(kind: &'static str, payload: &str, min: u32, max: u32) -> Result<u32, ValidationError> {
    let value: u32 = payload
        .trim()
        .parse()
        .map_err(|_| ValidationError::payload(kind, payload, "not a non-negative integer"))?;
    if value < min || value > max {
        return Err(ValidationError::payload(
            kind,
            payload,
            format!("must be within {min}..={max}"),
        ));
    }
    Ok(value)
}

fn parse_ints(kind: &'static str, payload: &str) -> Result<Vec<i32>, ValidationError> {
    payload
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<i32>()
                .map_err(|_| ValidationError::payload(kind, payload, "expected comma-separated integers"))
        })
        .collect()
}

fn parse_robot_position(payload: &str) -> Result<Message, ValidationError> {
    let values = parse_ints("setrobotpos", payload)?;
    match values.as_slice() {
        [x, y] => Ok(Message::SetRobotPosition(Position::new(*x, *y), None)),
        [x, y, o] => {
            let orientation = AbsoluteOrientation::from_value(*o);
            if !(0..8).contains(o) || !orientation.is_travel_direction() {
                return Err(ValidationError::payload(
                    "setrobotpos",
                    payload,
                    "orientation must be one of 1, 3, 5, 7",
                ));
            }
            Ok(Message::SetRobotPosition(Position::new(*x, *y), Some(orientation)))
        }
        _ => Err(ValidationError::payload("setrobotpos", payload, "expected x,y or x,y,o")),
    }
}

fn parse_map_status(payload: &str) -> Result<Vec<CellChange>, ValidationError> {
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }
    payload
        .split('|')
        .map(|triple| match parse_ints("mapstatus", triple)?.as_slice() {
            [x, y, v] => {
                let cell = u8::try_from(*v)
                    .ok()
                    .and_then(Cell::from_value)
                    .ok_or_else(|| ValidationError::payload("mapstatus", triple, "unknown cell value"))?;
                Ok(CellChange::new(Position::new(*x, *y), cell))
            }
            _ => Err(ValidationError::payload("mapstatus", triple, "expected x,y,v")),
        })
        .collect()
}
