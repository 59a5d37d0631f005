//! # Control State Machine Module
//!
//! Sequences the robot through its phases and correlates outbound commands
//! with device acknowledgements.
//!
//! ## Architecture
//!
//! - **ControlStateMachine**: owns the current state and the shared
//!   [`MachineContext`] (world model, configuration, pending acknowledgement)
//! - **State**: one per [`Phase`], each with its own ordered middleware chain
//! - **Middleware**: small handlers run in order for every inbound message;
//!   a middleware may consume the message and stop the chain
//! - **Controller**: the single dispatch loop draining [`ControlEvent`]s and
//!   routing the resulting commands and telemetry to the device queues
//!
//! Timers never touch the model. They post [`ControlEvent::Timer`] into the
//! same queue the devices feed, tagged with the generation of the state that
//! armed them, so a timer from a state that has since been left is ignored.

mod middleware;
mod states;

pub use middleware::{
    AckCallback, AckMiddleware, AckSlot, ExpectedAck, MapUpdateMiddleware, Middleware, MoveCommandMiddleware,
    ResetMiddleware,
};
pub use states::{
    EndState, ExplorationDoneState, ExploreMode, ExploringState, FastRunState, ReadyState, State,
};

use crate::codec::MapStore;
use crate::config::{Config, ExplorationConfig};
use crate::message::Message;
use crate::types::{Device, Phase};
use crate::world::World;
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Which timer produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerSource {
    /// Exploration time budget
    Countdown,
    /// Acknowledgement watchdog
    Watchdog,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    Tick(u32),
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerEvent {
    pub generation: u64,
    pub source: TimerSource,
    pub kind: TimerKind,
}

/// Everything the dispatch loop reacts to.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlEvent {
    Inbound { source: Device, message: Message },
    Timer(TimerEvent),
    Shutdown,
}

/// Output of one handler: commands for the sensing device, telemetry for
/// the operators.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outcome {
    pub commands: Vec<Message>,
    pub telemetry: Vec<Message>,
    /// Stop the middleware chain here
    pub consumed: bool,
}

impl Outcome {
    pub fn command(message: Message) -> Self {
        Self {
            commands: vec![message],
            ..Self::default()
        }
    }

    pub fn telemetry(message: Message) -> Self {
        Self {
            telemetry: vec![message],
            ..Self::default()
        }
    }

    pub fn consume(mut self) -> Self {
        self.consumed = true;
        self
    }

    pub fn extend(&mut self, other: Outcome) {
        self.commands.extend(other.commands);
        self.telemetry.extend(other.telemetry);
        self.consumed |= other.consumed;
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.telemetry.is_empty()
    }
}

/// Exploration limits set by operators; reset restores the configured ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExplorationSettings {
    pub time_limit_secs: Option<u32>,
    pub coverage_limit: Option<u32>,
}

impl From<&ExplorationConfig> for ExplorationSettings {
    fn from(config: &ExplorationConfig) -> Self {
        Self {
            time_limit_secs: config.time_limit_secs,
            coverage_limit: config.coverage_limit,
        }
    }
}

/// State shared by every phase.
pub struct MachineContext {
    pub world: World,
    pub config: Config,
    pub settings: ExplorationSettings,
    pub acks: AckSlot,
    store: Box<dyn MapStore>,
    events: UnboundedSender<ControlEvent>,
    generation: u64,
    transition: Option<Phase>,
}

impl MachineContext {
    /// Request a move to `phase` once the current message is handled.
    pub fn transit(&mut self, phase: Phase) {
        self.transition = Some(phase);
    }

    pub fn pending_transition(&self) -> Option<Phase> {
        self.transition
    }

    /// Sender for timer callbacks.
    pub fn events(&self) -> UnboundedSender<ControlEvent> {
        self.events.clone()
    }

    /// Generation of the current state.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn store(&self) -> &dyn MapStore {
        self.store.as_ref()
    }

    /// Fresh world model and operator settings, no pending acknowledgement.
    pub fn reset(&mut self) {
        self.world.reset();
        self.settings = ExplorationSettings::from(&self.config.exploration);
        if let Some(stale) = self.acks.clear() {
            debug!("reset dropped pending {stale}");
        }
    }
}

pub struct ControlStateMachine {
    state: Box<dyn State>,
    ctx: MachineContext,
}

impl ControlStateMachine {
    pub fn new(config: Config, store: Box<dyn MapStore>, events: UnboundedSender<ControlEvent>) -> Self {
        let ctx = MachineContext {
            world: World::new(&config.arena),
            settings: ExplorationSettings::from(&config.exploration),
            config,
            acks: AckSlot::default(),
            store,
            events,
            generation: 0,
            transition: None,
        };
        Self {
            state: Box::new(ReadyState::new()),
            ctx,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn context(&self) -> &MachineContext {
        &self.ctx
    }

    pub fn world(&self) -> &World {
        &self.ctx.world
    }

    /// For registering grid observers.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.ctx.world
    }

    pub fn handle(&mut self, event: ControlEvent) -> Outcome {
        let mut outcome = match event {
            ControlEvent::Inbound { source, message } => {
                debug!("[{}] {source} -> {message}", self.phase());
                states::process_input(self.state.as_mut(), &mut self.ctx, source, &message)
            }
            ControlEvent::Timer(event) => self.state.on_timer(&mut self.ctx, event),
            ControlEvent::Shutdown => Outcome::default(),
        };
        self.apply_transitions(&mut outcome);
        outcome
    }

    pub fn handle_message(&mut self, source: Device, message: Message) -> Outcome {
        self.handle(ControlEvent::Inbound { source, message })
    }

    fn apply_transitions(&mut self, outcome: &mut Outcome) {
        while let Some(phase) = self.ctx.transition.take() {
            info!("phase {} -> {}", self.state.phase(), phase);
            if let Some(stale) = self.ctx.acks.clear() {
                debug!("leaving {} dropped pending {stale}", self.state.phase());
            }
            self.ctx.generation += 1;
            self.state = states::enter(phase, &self.ctx);
            outcome.telemetry.push(Message::StateChange(phase));
            let entry = self.state.on_enter(&mut self.ctx);
            outcome.extend(entry);
        }
    }
}

/// Outbound queues: commands to the sensing device, telemetry to every operator.
pub struct Outbound {
    commands: UnboundedSender<Message>,
    telemetry: Vec<UnboundedSender<Message>>,
}

impl Outbound {
    pub fn new(commands: UnboundedSender<Message>, telemetry: Vec<UnboundedSender<Message>>) -> Self {
        Self { commands, telemetry }
    }

    pub fn deliver(&self, outcome: Outcome) {
        for message in outcome.commands {
            if self.commands.send(message).is_err() {
                warn!("sensing device queue closed, command dropped");
            }
        }
        for message in outcome.telemetry {
            for tx in &self.telemetry {
                if tx.send(message.clone()).is_err() {
                    debug!("operator queue closed, telemetry dropped");
                }
            }
        }
    }
}

/// Single-consumer dispatch loop around the state machine.
pub struct Controller {
    machine: ControlStateMachine,
    events: UnboundedReceiver<ControlEvent>,
    outbound: Outbound,
}

impl Controller {
    /// Returns the controller and the sender every inbound source feeds.
    pub fn new(config: Config, store: Box<dyn MapStore>, outbound: Outbound) -> (Self, UnboundedSender<ControlEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let machine = ControlStateMachine::new(config, store, tx.clone());
        (
            Self {
                machine,
                events: rx,
                outbound,
            },
            tx,
        )
    }

    pub fn machine(&self) -> &ControlStateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut ControlStateMachine {
        &mut self.machine
    }

    /// Runs until a `Shutdown` event arrives.
    pub async fn run(mut self) -> ControlStateMachine {
        info!("controller ready in phase {}", self.machine.phase());
        while let Some(event) = self.events.recv().await {
            if event == ControlEvent::Shutdown {
                break;
            }
            let outcome = self.machine.handle(event);
            self.outbound.deliver(outcome);
        }
        info!("controller stopped in phase {}", self.machine.phase());
        self.machine
    }
}
