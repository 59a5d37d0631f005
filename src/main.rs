// Controller: state machine plus one TCP link per device

use clap::Parser;
use log::{debug, error, info};
use mazerunner::codec::FileMapStore;
use mazerunner::map::ChannelObserver;
use mazerunner::network::DeviceListener;
use mazerunner::{Config, ControlEvent, Controller, Device, Outbound};
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "mazerunner", about = "Maze robot controller")]
struct Args {
    /// JSON configuration file; defaults are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // === PHASE 1: CONFIGURATION ===

    let config = match &args.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("configuration loaded from {}", path.display());
            config
        }
        None => Config::default(),
    };
    config.validate()?;

    // === PHASE 2: DEVICE QUEUES AND CONTROLLER ===

    let (arduino_tx, arduino_rx) = mpsc::unbounded_channel();
    let (android_tx, android_rx) = mpsc::unbounded_channel();
    let (pc_tx, pc_rx) = mpsc::unbounded_channel();
    let outbound = Outbound::new(arduino_tx, vec![android_tx, pc_tx]);

    let store = Box::new(FileMapStore::new(config.arena.width, config.arena.height));
    let network = config.network.clone();
    let (mut controller, events) = Controller::new(config, store, outbound);

    let (changes_tx, mut changes_rx) = mpsc::unbounded_channel();
    controller
        .machine_mut()
        .world_mut()
        .grid
        .add_observer(Box::new(ChannelObserver::new("map-log", changes_tx)));
    tokio::spawn(async move {
        while let Some(changes) = changes_rx.recv().await {
            debug!("map: {} cells changed", changes.len());
        }
    });

    // === PHASE 3: DEVICE LINKS ===

    for (device, outbound_rx) in [
        (Device::Android, android_rx),
        (Device::Arduino, arduino_rx),
        (Device::Pc, pc_rx),
    ] {
        let listener = DeviceListener::bind(device, &network.address_for(device)).await?;
        let inbound = events.clone();
        tokio::spawn(async move {
            if let Err(err) = listener.serve(inbound, outbound_rx).await {
                error!("{device} link stopped: {err}");
            }
        });
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = events.send(ControlEvent::Shutdown);
        }
    });

    // === PHASE 4: DISPATCH LOOP ===

    info!("controller running, waiting for devices");
    let machine = controller.run().await;
    info!("controller finished in phase {}", machine.phase());
    Ok(())
}
