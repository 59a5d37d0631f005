// Controller library for a grid-maze robot
// Binaries (controller, simulated device, console) build on these modules

pub mod types;          // Positions, cells, devices, phases
pub mod orientation;    // Headings, relative sensor slots, actions
pub mod error;          // Error enums for every layer
pub mod message;        // Typed wire messages and their validation
pub mod config;         // JSON configuration
pub mod map;            // Occupancy grid with observers
pub mod robot;          // Robot pose, footprint and sensors
pub mod world;          // Grid + robot model updated from sensing and moves
pub mod codec;          // Map file codecs
pub mod explore;        // Wall-following explorer
pub mod pathfinding;    // Orientation-aware A*
pub mod timer;          // Cancellable countdowns
pub mod fsm;            // Control state machine and dispatch loop
pub mod network;        // Framing and TCP device links
pub mod sim;            // Simulated arena and sensing device

// Re-exports of the main types
pub use config::Config;
pub use error::{MiddlewareError, SearchError, ValidationError};
pub use fsm::{ControlEvent, ControlStateMachine, Controller, Outbound};
pub use map::Grid;
pub use message::{Command, Message};
pub use robot::Robot;
pub use types::*;
pub use world::World;
