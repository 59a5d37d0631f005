use super::{MachineContext, Outcome};
use crate::error::MiddlewareError;
use crate::message::{Command, Message};
use crate::types::{Device, Phase};
use crate::world::SensePolicy;
use log::{debug, info};
use std::fmt;

/// One step of a state's input chain.
pub trait Middleware: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, ctx: &mut MachineContext, source: Device, message: &Message) -> Result<Outcome, MiddlewareError>;
}

/// Resumes a suspended protocol step once its acknowledgement arrives.
pub type AckCallback = Box<dyn FnOnce(&mut MachineContext) -> Result<Outcome, MiddlewareError> + Send>;

pub struct ExpectedAck {
    pub device: Device,
    pub message: Message,
    callback: AckCallback,
}

impl ExpectedAck {
    pub fn matches(&self, device: Device, message: &Message) -> bool {
        self.device == device && self.message == *message
    }
}

impl fmt::Display for ExpectedAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.message, self.device)
    }
}

impl fmt::Debug for ExpectedAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectedAck")
            .field("device", &self.device)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Holds at most one expected acknowledgement.
#[derive(Debug, Default)]
pub struct AckSlot {
    pending: Option<ExpectedAck>,
}

impl AckSlot {
    /// Register an expectation; fails if one is already pending.
    pub fn expect<F>(&mut self, device: Device, message: Message, callback: F) -> Result<(), MiddlewareError>
    where
        F: FnOnce(&mut MachineContext) -> Result<Outcome, MiddlewareError> + Send + 'static,
    {
        if let Some(pending) = &self.pending {
            return Err(MiddlewareError::AckPending {
                pending: pending.to_string(),
                requested: format!("{message} from {device}"),
            });
        }
        self.pending = Some(ExpectedAck {
            device,
            message,
            callback: Box::new(callback),
        });
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&ExpectedAck> {
        self.pending.as_ref()
    }

    /// Dequeue the expectation if `message` from `device` satisfies it.
    pub fn take_matching(&mut self, device: Device, message: &Message) -> Option<ExpectedAck> {
        if self.pending.as_ref().is_some_and(|p| p.matches(device, message)) {
            self.pending.take()
        } else {
            None
        }
    }

    pub fn clear(&mut self) -> Option<ExpectedAck> {
        self.pending.take()
    }
}

/// Peeks every message against the pending expectation and runs its callback on a match.
#[derive(Debug, Default)]
pub struct AckMiddleware;

impl Middleware for AckMiddleware {
    fn name(&self) -> &'static str {
        "ack"
    }

    fn process(&mut self, ctx: &mut MachineContext, source: Device, message: &Message) -> Result<Outcome, MiddlewareError> {
        let Some(expected) = ctx.acks.take_matching(source, message) else {
            return Ok(Outcome::default());
        };
        debug!("acknowledged {expected}");
        let outcome = (expected.callback)(ctx)?;
        Ok(outcome.consume())
    }
}

/// Operator move/turn commands: forward to the device and apply on acknowledgement.
#[derive(Debug, Default)]
pub struct MoveCommandMiddleware;

impl Middleware for MoveCommandMiddleware {
    fn name(&self) -> &'static str {
        "move-command"
    }

    fn process(&mut self, ctx: &mut MachineContext, source: Device, message: &Message) -> Result<Outcome, MiddlewareError> {
        let Message::Command(command) = message else {
            return Ok(Outcome::default());
        };
        if !source.is_command_source() || !command.is_motion() {
            return Ok(Outcome::default());
        }
        let expected = Message::RobotMove(command.clone());
        let command = command.clone();
        ctx.acks.expect(Device::Arduino, expected, move |ctx| {
            ctx.world.apply_move(&command);
            Ok(Outcome::telemetry(Message::RobotMove(command)))
        })?;
        Ok(Outcome::command(message.clone()).consume())
    }
}

/// Sensor readings from the sensing device are fused into the grid.
#[derive(Debug, Default)]
pub struct MapUpdateMiddleware;

impl Middleware for MapUpdateMiddleware {
    fn name(&self) -> &'static str {
        "map-update"
    }

    fn process(&mut self, ctx: &mut MachineContext, source: Device, message: &Message) -> Result<Outcome, MiddlewareError> {
        let Message::MapUpdate(readings) = message else {
            return Ok(Outcome::default());
        };
        if source != Device::Arduino {
            return Ok(Outcome::default());
        }
        let policy = SensePolicy::from(&ctx.config.map_update);
        let sensed = ctx.world.sense(readings, policy);
        if ctx.config.map_update.report_changes && !sensed.changes.is_empty() {
            return Ok(Outcome::telemetry(Message::MapStatus(sensed.changes)));
        }
        Ok(Outcome::default())
    }
}

#[derive(Debug, Default)]
pub struct ResetMiddleware;

impl Middleware for ResetMiddleware {
    fn name(&self) -> &'static str {
        "reset"
    }

    fn process(&mut self, ctx: &mut MachineContext, source: Device, message: &Message) -> Result<Outcome, MiddlewareError> {
        if *message != Message::Command(Command::Reset) || !source.is_command_source() {
            return Ok(Outcome::default());
        }
        info!("reset requested by {source}");
        ctx.reset();
        ctx.transit(Phase::Ready);
        Ok(Outcome::command(message.clone()).consume())
    }
}
