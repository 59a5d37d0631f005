// Operator console
// Reads command lines from stdin, sends them as JSON frames and prints the controller's telemetry

use clap::Parser;
use log::warn;
use mazerunner::error::{ProtocolError, ValidationError};
use mazerunner::network::{FrameSplitter, connect_with_retry, write_frame};
use mazerunner::{Config, Device, Message};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "console", about = "Operator console for the maze controller")]
struct Args {
    /// Operator link to use: android or pc
    #[arg(short, long, default_value = "pc", value_parser = parse_device)]
    device: Device,

    /// Controller configuration, for the link port
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Controller address; overrides the configured port
    #[arg(short, long)]
    address: Option<String>,
}

fn parse_device(label: &str) -> Result<Device, ProtocolError> {
    Device::from_label(label)
        .filter(|device| device.is_command_source())
        .ok_or_else(|| ProtocolError::UnknownDevice(label.to_string()))
}

const HELP: &str = "\
commands:
  explore | endexplore | run | reset | sr | calibrate | sense
  mf | tl | tr | tb | mf*N
  time SECONDS        exploration time limit
  coverage PERCENT    exploration coverage limit
  pos X,Y[,O]         place the robot (O in 1, 3, 5, 7)
  load PATH           load a map file on the controller
  raw TYPE PAYLOAD    any message type
  help | quit";

/// One console line to a message; `None` for blank lines.
fn parse_line(line: &str) -> Result<Option<Message>, ValidationError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let message = match word {
        "time" => Message::parse("setexploretime", rest)?,
        "coverage" => Message::parse("setexplorecoverage", rest)?,
        "pos" => Message::parse("setrobotpos", rest)?,
        "load" => Message::parse("loadmap", rest)?,
        "raw" => {
            let (kind, payload) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            Message::parse(kind, payload.trim())?
        }
        _ => Message::parse("cmd", line)?,
    };
    Ok(Some(message))
}

fn print_telemetry(message: &Message) {
    match message {
        Message::StateChange(phase) => println!("🔄 phase: {phase}"),
        Message::ExploreCoverage(percent) => println!("🗺️  coverage: {percent}%"),
        Message::ExploreRemainingTime(secs) => println!("⏱️  time left: {secs}s"),
        Message::RobotMove(command) => println!("🤖 robot: {command}"),
        Message::MapStatus(changes) => println!("🧱 {} cells updated", changes.len()),
        other => println!("📨 {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let address = args
        .address
        .unwrap_or_else(|| config.network.address_for(args.device));

    println!("📡 Connecting to {address} as {}...", args.device);
    let stream = connect_with_retry(&address, 10, Duration::from_secs(1)).await?;
    println!("✅ Connected. Type `help` for commands.");
    let (mut reader, mut writer) = stream.into_split();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut splitter = FrameSplitter::new();
    let mut buf = vec![0u8; 4096];
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "quit" | "exit" => break,
                    "help" => {
                        println!("{HELP}");
                        continue;
                    }
                    _ => {}
                }
                match parse_line(&line) {
                    Ok(Some(message)) => write_frame(&mut writer, &message).await?,
                    Ok(None) => {}
                    Err(err) => println!("⚠️  {err}"),
                }
            }
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    println!("📴 Controller closed the link.");
                    break;
                }
                for message in splitter.push_messages(&buf[..n]) {
                    match message {
                        Ok(message) => print_telemetry(&message),
                        Err(err) => warn!("frame dropped: {err}"),
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mazerunner::message::Command;
    use mazerunner::types::Position;

    #[test]
    fn console_lines_become_messages() {
        assert_eq!(parse_line("explore").unwrap(), Some(Message::Command(Command::Explore)));
        assert_eq!(parse_line("  mf*3 ").unwrap(), Some(Message::Command(Command::ForwardBy(3))));
        assert_eq!(parse_line("time 120").unwrap(), Some(Message::SetExploreTimeLimit(120)));
        assert_eq!(
            parse_line("pos 5,6").unwrap(),
            Some(Message::SetRobotPosition(Position::new(5, 6), None))
        );
        assert_eq!(parse_line("raw setexplorecoverage 80").unwrap(), Some(Message::SetExploreCoverage(80)));
        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(parse_line("coverage 140").is_err());
        assert!(parse_line("jump").is_err());
    }

    #[test]
    fn only_operator_links() {
        assert_eq!(parse_device("android").unwrap(), Device::Android);
        assert!(parse_device("arduino").is_err());
    }
}
