use mazerunner::codec::FileMapStore;
use mazerunner::config::Config;
use mazerunner::fsm::{ControlEvent, ControlStateMachine, Controller, Outbound, Outcome, TimerEvent, TimerKind, TimerSource};
use mazerunner::message::{Command, Message};
use mazerunner::sim::{SimulatedArena, SimulatedDevice};
use mazerunner::types::{Device, Phase, Position};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Controller and simulated robot wired back to back, synchronously.
struct Mission {
    machine: ControlStateMachine,
    device: SimulatedDevice,
    inbox: VecDeque<Message>,
    telemetry: Vec<Message>,
    _events: UnboundedReceiver<ControlEvent>,
}

impl Mission {
    fn new(config: Config) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let arena = SimulatedArena::empty(&config.arena);
        let device = SimulatedDevice::new(arena, &config.arena);
        let store = Box::new(FileMapStore::new(config.arena.width, config.arena.height));
        Self {
            machine: ControlStateMachine::new(config, store, tx),
            device,
            inbox: VecDeque::new(),
            telemetry: Vec::new(),
            _events: rx,
        }
    }

    fn route(&mut self, outcome: Outcome) {
        self.telemetry.extend(outcome.telemetry);
        for command in &outcome.commands {
            self.inbox.extend(self.device.handle(command));
        }
    }

    fn operator(&mut self, message: Message) {
        let outcome = self.machine.handle_message(Device::Pc, message);
        self.route(outcome);
    }

    fn timer(&mut self, source: TimerSource, kind: TimerKind) {
        let event = TimerEvent {
            generation: self.machine.context().generation(),
            source,
            kind,
        };
        let outcome = self.machine.handle(ControlEvent::Timer(event));
        self.route(outcome);
    }

    /// Deliver up to `limit` device replies.
    fn pump(&mut self, limit: usize) -> usize {
        let mut delivered = 0;
        while delivered < limit {
            let Some(reply) = self.inbox.pop_front() else { break };
            let outcome = self.machine.handle_message(Device::Arduino, reply);
            self.route(outcome);
            delivered += 1;
        }
        delivered
    }

    fn drain(&mut self) {
        let delivered = self.pump(5_000);
        assert!(self.inbox.is_empty(), "mission still busy after {delivered} replies");
    }

    fn robot_moves(&self) -> usize {
        self.telemetry
            .iter()
            .filter(|m| matches!(m, Message::RobotMove(_)))
            .count()
    }
}

#[test]
fn explores_returns_and_runs_to_the_goal() {
    let mut mission = Mission::new(Config::default());

    mission.operator(Message::Command(Command::Explore));
    mission.drain();

    assert_eq!(mission.machine.phase(), Phase::ExplorationDone);
    let world = mission.machine.world();
    assert_eq!(world.robot.position(), Position::new(1, 18));
    assert_eq!(mission.device.robot().position(), Position::new(1, 18));
    assert!(world.coverage() >= 60.0, "coverage {}", world.coverage());
    assert!(mission.robot_moves() > 40);
    assert!(mission.telemetry.contains(&Message::StateChange(Phase::Exploring)));
    assert!(mission.telemetry.contains(&Message::StateChange(Phase::ExplorationDone)));

    mission.operator(Message::Command(Command::FastRun));
    assert_eq!(mission.machine.phase(), Phase::FastRun);
    mission.drain();

    assert_eq!(mission.machine.phase(), Phase::End);
    assert_eq!(mission.machine.world().robot.position(), Position::new(13, 1));
    assert_eq!(mission.device.robot().position(), Position::new(13, 1));
    assert_eq!(mission.telemetry.last(), Some(&Message::StateChange(Phase::End)));
}

#[test]
fn running_out_of_time_brings_the_robot_home() {
    let mut mission = Mission::new(Config::default());
    mission.operator(Message::SetExploreTimeLimit(100));
    mission.operator(Message::Command(Command::Explore));
    mission.pump(10);
    assert_ne!(mission.machine.world().robot.position(), Position::new(1, 18));

    mission.timer(TimerSource::Countdown, TimerKind::Tick(50));
    assert!(mission.telemetry.contains(&Message::ExploreRemainingTime(50)));
    mission.drain();

    assert_eq!(mission.machine.phase(), Phase::ExplorationDone);
    assert_eq!(mission.machine.world().robot.position(), Position::new(1, 18));
    assert!(mission.machine.world().coverage() < 60.0);
}

#[test]
fn reset_after_the_run_starts_over() {
    let mut mission = Mission::new(Config::default());
    mission.operator(Message::Command(Command::Explore));
    mission.drain();
    mission.operator(Message::Command(Command::FastRun));
    mission.drain();
    assert_eq!(mission.machine.phase(), Phase::End);

    mission.operator(Message::Command(Command::Reset));
    assert_eq!(mission.machine.phase(), Phase::Ready);
    assert_eq!(mission.device.robot().position(), Position::new(1, 18));
    assert!(mission.machine.world().coverage() < 10.0);
}

async fn wait_for(rx: &mut UnboundedReceiver<Message>, expected: Message) {
    let found = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(message) = rx.recv().await {
            if message == expected {
                return true;
            }
        }
        false
    })
    .await;
    assert!(matches!(found, Ok(true)), "never saw {expected}");
}

#[tokio::test]
async fn controller_drives_the_mission_through_its_queues() {
    let config = Config::default();
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    let (tele_tx, mut tele_rx) = mpsc::unbounded_channel();
    let store = Box::new(FileMapStore::new(config.arena.width, config.arena.height));
    let mut device = SimulatedDevice::new(SimulatedArena::empty(&config.arena), &config.arena);
    let (controller, events) = Controller::new(config, store, Outbound::new(cmd_tx, vec![tele_tx]));
    let controller = tokio::spawn(controller.run());

    let replies = events.clone();
    tokio::spawn(async move {
        while let Some(command) = cmd_rx.recv().await {
            for reply in device.handle(&command) {
                let event = ControlEvent::Inbound {
                    source: Device::Arduino,
                    message: reply,
                };
                if replies.send(event).is_err() {
                    return;
                }
            }
        }
    });

    let operator = |message| ControlEvent::Inbound {
        source: Device::Android,
        message,
    };
    events.send(operator(Message::Command(Command::Explore))).unwrap();
    wait_for(&mut tele_rx, Message::StateChange(Phase::ExplorationDone)).await;
    events.send(operator(Message::Command(Command::FastRun))).unwrap();
    wait_for(&mut tele_rx, Message::StateChange(Phase::End)).await;

    events.send(ControlEvent::Shutdown).unwrap();
    let machine = controller.await.unwrap();
    assert_eq!(machine.phase(), Phase::End);
    assert_eq!(machine.world().robot.position(), Position::new(13, 1));
}
