// Simulated sensing device
// Connects to the controller's arduino link and answers commands against a ground-truth arena

use clap::Parser;
use log::{debug, info, warn};
use mazerunner::Config;
use mazerunner::codec::{FileMapStore, MapStore};
use mazerunner::network::{FrameSplitter, connect_with_retry, write_frame};
use mazerunner::sim::{SimulatedArena, SimulatedDevice};
use mazerunner::types::{Cell, Device};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;

#[derive(Parser, Debug)]
#[command(name = "simulation", about = "Simulated robot for the maze controller")]
struct Args {
    /// Controller configuration, for arena geometry and the device port
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Controller address; defaults to the configured arduino link
    #[arg(short, long)]
    address: Option<String>,

    /// Noise seed for generated obstacles
    #[arg(long)]
    seed: Option<u32>,

    /// Generate obstacles where the noise exceeds this threshold
    #[arg(long, value_name = "THRESHOLD")]
    obstacles: Option<f64>,

    /// Ground-truth map file (text or .bin)
    #[arg(long, conflicts_with = "obstacles")]
    map: Option<PathBuf>,

    /// Delay before each reply, in milliseconds
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,
}

fn print_arena(arena: &SimulatedArena) {
    for row in arena.grid().rows() {
        let line: String = row
            .iter()
            .map(|cell| if *cell == Cell::Obstacle { '#' } else { '.' })
            .collect();
        println!("   {line}");
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

    // === PHASE 1: GROUND TRUTH ===

    println!("🗺️  Building the simulated arena...");
    let arena = if let Some(path) = &args.map {
        let store = FileMapStore::new(config.arena.width, config.arena.height);
        SimulatedArena::from_rows(&config.arena, store.load(path)?)?
    } else if let Some(threshold) = args.obstacles {
        SimulatedArena::generate(&config.arena, args.seed, threshold)
    } else {
        SimulatedArena::empty(&config.arena)
    };
    println!("✅ Arena ready: {} obstacle cells", arena.obstacle_count());
    print_arena(&arena);
    let mut device = SimulatedDevice::new(arena, &config.arena);

    // === PHASE 2: CONNECTION TO THE CONTROLLER ===

    let address = args
        .address
        .unwrap_or_else(|| config.network.address_for(Device::Arduino));
    println!("📡 Connecting to {address}...");
    let stream = connect_with_retry(&address, 30, Duration::from_secs(1)).await?;
    println!("✅ Connected.");
    let (mut reader, mut writer) = stream.into_split();

    // === PHASE 3: COMMAND LOOP ===

    let delay = Duration::from_millis(args.delay_ms);
    let mut splitter = FrameSplitter::new();
    let mut buf = vec![0u8; 4096];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            println!("📴 Controller closed the link.");
            break;
        }
        for message in splitter.push_messages(&buf[..n]) {
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    warn!("frame dropped: {err}");
                    continue;
                }
            };
            debug!("<< {message}");
            for reply in device.handle(&message) {
                tokio::time::sleep(delay).await;
                debug!(">> {reply}");
                write_frame(&mut writer, &reply).await?;
            }
        }
        info!(
            "robot at {} facing {}",
            device.robot().position(),
            device.robot().orientation()
        );
    }
    Ok(())
}
