use super::middleware::{AckMiddleware, MapUpdateMiddleware, Middleware, MoveCommandMiddleware, ResetMiddleware};
use super::{ControlEvent, MachineContext, Outcome, TimerEvent, TimerKind, TimerSource};
use crate::error::{MiddlewareError, ProtocolError, SearchError};
use crate::explore::MazeExplorer;
use crate::map::Grid;
use crate::message::{Command, Message};
use crate::orientation::{AbsoluteOrientation, Action};
use crate::pathfinding::{AStarPathfinder, Path, PathfinderConfig};
use crate::timer::Timer;
use crate::types::{Cell, CellChange, Device, Phase, Position};
use log::{debug, error, info, warn};
use std::time::Duration;

/// One phase of the mission.
pub trait State: Send {
    fn phase(&self) -> Phase;

    /// Middlewares run in order before `post_process`.
    fn chain(&mut self) -> &mut [Box<dyn Middleware>];

    fn on_enter(&mut self, _ctx: &mut MachineContext) -> Outcome {
        Outcome::default()
    }

    /// Phase-specific handling once no middleware consumed the message.
    fn post_process(&mut self, ctx: &mut MachineContext, source: Device, message: &Message)
    -> Result<Outcome, MiddlewareError>;

    fn on_timer(&mut self, _ctx: &mut MachineContext, event: TimerEvent) -> Outcome {
        debug!("timer event {event:?} ignored while {}", self.phase());
        Outcome::default()
    }
}

pub(crate) fn enter(phase: Phase, ctx: &MachineContext) -> Box<dyn State> {
    match phase {
        Phase::Ready => Box::new(ReadyState::new()),
        Phase::Exploring => Box::new(ExploringState::new(ctx.generation())),
        Phase::ExplorationDone => Box::new(ExplorationDoneState::new()),
        Phase::FastRun => Box::new(FastRunState::new()),
        Phase::End => Box::new(EndState::new()),
    }
}

/// Run the chain then the state's own handler. A failing middleware is
/// skipped; a consumed message or a pending transition stops the chain.
pub(crate) fn process_input(
    state: &mut dyn State,
    ctx: &mut MachineContext,
    source: Device,
    message: &Message,
) -> Outcome {
    let phase = state.phase();
    let mut outcome = Outcome::default();
    for middleware in state.chain().iter_mut() {
        match middleware.process(ctx, source, message) {
            Ok(out) => outcome.extend(out),
            Err(err) => warn!("[{phase}] {} middleware skipped `{message}`: {err}", middleware.name()),
        }
        if outcome.consumed || ctx.pending_transition().is_some() {
            return outcome;
        }
    }
    match state.post_process(ctx, source, message) {
        Ok(out) => outcome.extend(out),
        Err(err @ MiddlewareError::Search(_)) => error!("[{phase}] {err}"),
        Err(err) => warn!("[{phase}] `{message}` from {source} dropped: {err}"),
    }
    outcome
}

fn unexpected(phase: Phase, source: Device, message: &Message) -> Result<Outcome, MiddlewareError> {
    let err = ProtocolError::UnexpectedMessage {
        device: source,
        kind: message.kind(),
        phase,
    };
    debug!("{err}");
    Ok(Outcome::default())
}

fn timer_event(generation: u64, source: TimerSource, kind: TimerKind) -> ControlEvent {
    ControlEvent::Timer(TimerEvent {
        generation,
        source,
        kind,
    })
}

fn known_cells(grid: &Grid) -> Vec<CellChange> {
    let mut cells = Vec::new();
    for (y, row) in grid.rows().iter().enumerate() {
        for (x, cell) in row.iter().enumerate() {
            if *cell != Cell::Unknown {
                cells.push(CellChange::new(Position::new(x as i32, y as i32), *cell));
            }
        }
    }
    cells
}

fn plan(grid: &Grid, from: (Position, AbsoluteOrientation), target: Position) -> Result<Path, SearchError> {
    let (start, facing) = from;
    AStarPathfinder::new(grid, target, PathfinderConfig::default()).get_shortest_path(start, facing)
}

// ---------------------------------------------------------------------------

pub struct ReadyState {
    chain: Vec<Box<dyn Middleware>>,
}

impl ReadyState {
    pub fn new() -> Self {
        Self {
            chain: vec![
                Box::new(AckMiddleware),
                Box::new(MoveCommandMiddleware),
                Box::new(MapUpdateMiddleware),
                Box::new(ResetMiddleware),
            ],
        }
    }
}

impl Default for ReadyState {
    fn default() -> Self {
        Self::new()
    }
}

impl State for ReadyState {
    fn phase(&self) -> Phase {
        Phase::Ready
    }

    fn chain(&mut self) -> &mut [Box<dyn Middleware>] {
        &mut self.chain
    }

    fn post_process(
        &mut self,
        ctx: &mut MachineContext,
        source: Device,
        message: &Message,
    ) -> Result<Outcome, MiddlewareError> {
        if !source.is_command_source() {
            return match message {
                Message::MapUpdate(_) | Message::RobotMove(_) => Ok(Outcome::default()),
                _ => unexpected(self.phase(), source, message),
            };
        }
        match message {
            Message::Command(Command::Explore) => {
                ctx.transit(Phase::Exploring);
                Ok(Outcome::default())
            }
            Message::Command(Command::EndExplore) => {
                ctx.transit(Phase::ExplorationDone);
                Ok(Outcome::default())
            }
            Message::Command(Command::Calibrate | Command::Sense | Command::SensorRequest) => {
                Ok(Outcome::command(message.clone()))
            }
            Message::SetExploreTimeLimit(secs) => {
                info!("exploration time limit set to {secs}s");
                ctx.settings.time_limit_secs = Some(*secs);
                Ok(Outcome::default())
            }
            Message::SetExploreCoverage(percent) => {
                info!("exploration coverage limit set to {percent}%");
                ctx.settings.coverage_limit = Some(*percent);
                Ok(Outcome::default())
            }
            Message::SetRobotPosition(position, orientation) => {
                let grid = &ctx.world.grid;
                if position.block().iter().any(|p| grid.is_out_of_arena(*p)) {
                    return Err(MiddlewareError::InvalidPosition(*position));
                }
                ctx.world.robot.set_pose(*position, *orientation);
                let facing = ctx.world.robot.orientation();
                info!("robot placed at {position} facing {facing}");
                Ok(Outcome::command(Message::SetRobotPosition(*position, Some(facing))))
            }
            Message::LoadMap(path) => {
                let rows = ctx.store().load(std::path::Path::new(path))?;
                ctx.world.grid.replace_cells(rows)?;
                Ok(Outcome::telemetry(Message::MapStatus(known_cells(&ctx.world.grid))))
            }
            _ => unexpected(self.phase(), source, message),
        }
    }
}

// ---------------------------------------------------------------------------

/// Exploring sub-state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExploreMode {
    /// Wall-following until a stop or go-back condition
    FirstRound,
    /// Re-planned A* walk to the start zone
    GoBack,
}

pub struct ExploringState {
    chain: Vec<Box<dyn Middleware>>,
    generation: u64,
    mode: ExploreMode,
    explorer: MazeExplorer,
    countdown: Timer,
    watchdog: Timer,
    started: bool,
    time_up: bool,
    go_back_due: bool,
}

impl ExploringState {
    pub fn new(generation: u64) -> Self {
        Self {
            chain: vec![Box::new(AckMiddleware), Box::new(MapUpdateMiddleware)],
            generation,
            mode: ExploreMode::FirstRound,
            explorer: MazeExplorer::new(),
            countdown: Timer::new(),
            watchdog: Timer::new(),
            started: false,
            time_up: false,
            go_back_due: false,
        }
    }

    pub fn mode(&self) -> ExploreMode {
        self.mode
    }

    // The countdown starts with the first input, not on entry.
    fn ensure_countdown(&mut self, ctx: &MachineContext) {
        if self.started {
            return;
        }
        self.started = true;
        let Some(limit) = ctx.settings.time_limit_secs else {
            return;
        };
        let generation = self.generation;
        let (ticks, end) = (ctx.events(), ctx.events());
        let started = self.countdown.start(
            limit,
            Duration::from_secs(1),
            move |remaining| {
                let _ = ticks.send(timer_event(generation, TimerSource::Countdown, TimerKind::Tick(remaining)));
            },
            move || {
                let _ = end.send(timer_event(generation, TimerSource::Countdown, TimerKind::Expired));
            },
        );
        match started {
            Ok(()) => info!("exploration countdown started: {limit}s"),
            Err(err) => warn!("exploration countdown not started: {err}"),
        }
    }

    fn arm_watchdog(&mut self, ctx: &MachineContext) {
        let Some(timeout) = ctx.config.exploration.ack_timeout_ms else {
            return;
        };
        let generation = self.generation;
        let events = ctx.events();
        let armed = self.watchdog.start_once(Duration::from_millis(timeout), move || {
            let _ = events.send(timer_event(generation, TimerSource::Watchdog, TimerKind::Expired));
        });
        if let Err(err) = armed {
            debug!("watchdog not armed: {err}");
        }
    }

    fn go_back(&mut self, reason: &str) {
        if self.mode != ExploreMode::GoBack {
            info!("heading back to start: {reason}");
            self.mode = ExploreMode::GoBack;
        }
    }

    fn step(&mut self, ctx: &mut MachineContext) -> Result<Outcome, MiddlewareError> {
        let coverage = ctx.world.coverage();
        let mut outcome = Outcome::telemetry(Message::ExploreCoverage(coverage.floor() as u32));
        if ctx.acks.is_pending() {
            return Ok(outcome);
        }
        self.watchdog.stop();

        let at_start = ctx.world.robot_at_start();
        let coverage_limit = ctx.settings.coverage_limit;
        let threshold = coverage_limit.unwrap_or(ctx.config.exploration.end_coverage_threshold);
        if ctx.world.grid.is_fully_explored() {
            if at_start || !ctx.config.exploration.return_to_start {
                outcome.extend(self.finish(ctx));
                return Ok(outcome);
            }
            self.go_back("arena fully explored");
        } else if at_start
            && (self.time_up
                || self.go_back_due
                || self.mode == ExploreMode::GoBack
                || coverage >= f64::from(threshold))
        {
            outcome.extend(self.finish(ctx));
            return Ok(outcome);
        } else if !at_start {
            if self.time_up {
                self.go_back("time is up");
            } else if self.go_back_due {
                self.go_back("time budget running out");
            } else if coverage_limit.is_some_and(|limit| coverage >= f64::from(limit)) {
                self.go_back("coverage limit reached");
            }
        }

        let command = match self.mode {
            ExploreMode::FirstRound => {
                let action = self
                    .explorer
                    .get_next_move(&ctx.world.grid, &ctx.world.robot)
                    .unwrap_or_else(|| {
                        debug!("boxed in, turning back");
                        Action::TurnBack
                    });
                Command::Move(action)
            }
            ExploreMode::GoBack => {
                let robot = &ctx.world.robot;
                let grid = &ctx.world.grid;
                match plan(grid, (robot.position(), robot.orientation()), grid.start_center()) {
                    Ok(path) => match path.commands.first() {
                        Some(action) => Command::Move(*action),
                        None => {
                            outcome.extend(self.finish(ctx));
                            return Ok(outcome);
                        }
                    },
                    Err(err) => {
                        error!("cannot plan the way back: {err}");
                        outcome.extend(self.finish(ctx));
                        return Ok(outcome);
                    }
                }
            }
        };
        outcome.extend(self.issue(ctx, command)?);
        Ok(outcome)
    }

    fn issue(&mut self, ctx: &mut MachineContext, command: Command) -> Result<Outcome, MiddlewareError> {
        let applied = command.clone();
        ctx.acks.expect(Device::Arduino, Message::RobotMove(command.clone()), move |ctx| {
            ctx.world.apply_move(&applied);
            Ok(Outcome::telemetry(Message::RobotMove(applied)))
        })?;
        self.arm_watchdog(ctx);
        Ok(Outcome::command(Message::Command(command)))
    }

    fn finish(&mut self, ctx: &mut MachineContext) -> Outcome {
        self.countdown.stop();
        self.watchdog.stop();
        if let Some(path) = &ctx.config.map_save_path {
            if let Err(err) = ctx.store().save(path, &ctx.world.grid) {
                warn!("explored map not saved to {}: {err}", path.display());
            }
        }
        info!("exploration finished at {:.1}% coverage", ctx.world.coverage());
        ctx.transit(Phase::ExplorationDone);
        Outcome::command(Message::Command(Command::EndExplore))
    }
}

impl State for ExploringState {
    fn phase(&self) -> Phase {
        Phase::Exploring
    }

    fn chain(&mut self) -> &mut [Box<dyn Middleware>] {
        &mut self.chain
    }

    fn on_enter(&mut self, _ctx: &mut MachineContext) -> Outcome {
        Outcome::command(Message::Command(Command::Explore))
    }

    fn post_process(
        &mut self,
        ctx: &mut MachineContext,
        source: Device,
        message: &Message,
    ) -> Result<Outcome, MiddlewareError> {
        self.ensure_countdown(ctx);
        match message {
            Message::MapUpdate(_) if source == Device::Arduino => self.step(ctx),
            Message::Command(Command::EndExplore) if source.is_command_source() => Ok(self.finish(ctx)),
            Message::RobotMove(_) if source == Device::Arduino => {
                debug!("robot move `{message}` matched no pending acknowledgement");
                Ok(Outcome::default())
            }
            _ => unexpected(self.phase(), source, message),
        }
    }

    fn on_timer(&mut self, ctx: &mut MachineContext, event: TimerEvent) -> Outcome {
        if event.generation != self.generation {
            debug!("stale timer event {event:?}");
            return Outcome::default();
        }
        match (event.source, event.kind) {
            (TimerSource::Countdown, TimerKind::Tick(remaining)) => {
                if let Some(limit) = ctx.settings.time_limit_secs {
                    let deadline = f64::from(limit) * ctx.config.exploration.go_back_fraction;
                    if !self.go_back_due && f64::from(remaining) <= deadline {
                        info!("{remaining}s of exploration left");
                        self.go_back_due = true;
                    }
                }
                Outcome::telemetry(Message::ExploreRemainingTime(remaining))
            }
            (TimerSource::Countdown, TimerKind::Expired) => {
                self.time_up = true;
                let mut outcome = Outcome::telemetry(Message::ExploreRemainingTime(0));
                if ctx.world.robot_at_start() && !ctx.acks.is_pending() {
                    outcome.extend(self.finish(ctx));
                }
                outcome
            }
            (TimerSource::Watchdog, TimerKind::Expired) => {
                if let Some(stale) = ctx.acks.clear() {
                    warn!("no acknowledgement for {stale}, requesting sensors");
                }
                self.arm_watchdog(ctx);
                Outcome::command(Message::Command(Command::SensorRequest))
            }
            (TimerSource::Watchdog, TimerKind::Tick(_)) => Outcome::default(),
        }
    }
}

// ---------------------------------------------------------------------------

pub struct ExplorationDoneState {
    chain: Vec<Box<dyn Middleware>>,
}

impl ExplorationDoneState {
    pub fn new() -> Self {
        Self {
            chain: vec![
                Box::new(AckMiddleware),
                Box::new(ResetMiddleware),
                Box::new(MoveCommandMiddleware),
            ],
        }
    }
}

impl Default for ExplorationDoneState {
    fn default() -> Self {
        Self::new()
    }
}

impl State for ExplorationDoneState {
    fn phase(&self) -> Phase {
        Phase::ExplorationDone
    }

    fn chain(&mut self) -> &mut [Box<dyn Middleware>] {
        &mut self.chain
    }

    fn post_process(
        &mut self,
        ctx: &mut MachineContext,
        source: Device,
        message: &Message,
    ) -> Result<Outcome, MiddlewareError> {
        match message {
            Message::Command(Command::FastRun) if source.is_command_source() => {
                let robot = &ctx.world.robot;
                let grid = &ctx.world.grid;
                let path = plan(grid, (robot.position(), robot.orientation()), grid.end_center())?;
                info!(
                    "fast run planned: {} moves, {} turns, cost {}",
                    path.moves(),
                    path.turns(),
                    path.cost
                );
                let commands = if ctx.config.fast_run.compress {
                    path.compressed()
                } else {
                    path.commands.iter().map(|a| Command::Move(*a)).collect()
                };
                let mut outcome = Outcome::command(Message::Command(Command::FastRun));
                outcome.commands.extend(commands.into_iter().map(Message::Command));
                ctx.transit(Phase::FastRun);
                Ok(outcome)
            }
            Message::MapUpdate(_) | Message::RobotMove(_) => Ok(Outcome::default()),
            _ => unexpected(self.phase(), source, message),
        }
    }
}

// ---------------------------------------------------------------------------

pub struct FastRunState {
    chain: Vec<Box<dyn Middleware>>,
}

impl FastRunState {
    pub fn new() -> Self {
        Self {
            chain: vec![Box::new(AckMiddleware)],
        }
    }

    fn check_goal(ctx: &mut MachineContext) {
        if ctx.world.robot_at_goal() {
            info!("goal reached");
            ctx.transit(Phase::End);
        }
    }
}

impl Default for FastRunState {
    fn default() -> Self {
        Self::new()
    }
}

impl State for FastRunState {
    fn phase(&self) -> Phase {
        Phase::FastRun
    }

    fn chain(&mut self) -> &mut [Box<dyn Middleware>] {
        &mut self.chain
    }

    fn on_enter(&mut self, ctx: &mut MachineContext) -> Outcome {
        Self::check_goal(ctx);
        Outcome::default()
    }

    fn post_process(
        &mut self,
        ctx: &mut MachineContext,
        source: Device,
        message: &Message,
    ) -> Result<Outcome, MiddlewareError> {
        match message {
            Message::RobotMove(command) if source == Device::Arduino => {
                ctx.world.apply_move(command);
                Self::check_goal(ctx);
                Ok(Outcome::telemetry(message.clone()))
            }
            Message::MapUpdate(_) => Ok(Outcome::default()),
            _ => unexpected(self.phase(), source, message),
        }
    }
}

// ---------------------------------------------------------------------------

pub struct EndState {
    chain: Vec<Box<dyn Middleware>>,
}

impl EndState {
    pub fn new() -> Self {
        Self {
            chain: vec![
                Box::new(AckMiddleware),
                Box::new(ResetMiddleware),
                Box::new(MoveCommandMiddleware),
            ],
        }
    }
}

impl Default for EndState {
    fn default() -> Self {
        Self::new()
    }
}

impl State for EndState {
    fn phase(&self) -> Phase {
        Phase::End
    }

    fn chain(&mut self) -> &mut [Box<dyn Middleware>] {
        &mut self.chain
    }

    fn post_process(
        &mut self,
        _ctx: &mut MachineContext,
        source: Device,
        message: &Message,
    ) -> Result<Outcome, MiddlewareError> {
        match message {
            Message::MapUpdate(_) | Message::RobotMove(_) => Ok(Outcome::default()),
            _ => unexpected(self.phase(), source, message),
        }
    }
}
