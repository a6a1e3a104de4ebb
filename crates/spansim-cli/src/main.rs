//! spansim demo driver
//!
//! Stands in for the excluded rendering layer: builds a ring of simulated
//! bridges, runs the simulation for a bounded time, and prints what the
//! renderer would draw. With `--stopped` the engines stay down and a single
//! injected frame demonstrates the flood relay and its loop guard instead.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use spansim_core::config::BridgeConfig;
use spansim_core::events::{AppEvent, Command, StateReport};
use spansim_core::frame::protocol_frame_bytes;
use spansim_core::types::{BridgeId, MacAddr, PortIndex, PortRef};
use spansim_core::wire::WireEnd;
use spansim_runtime::{SimClient, Simulation};

/// How long to wait for any single expected app event.
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "spansim", about = "Virtual LAN spanning-tree simulation demo")]
struct Cli {
    /// Number of bridges, wired in a ring
    #[arg(long, default_value_t = 3)]
    bridges: u32,

    /// Ports per bridge
    #[arg(long, default_value_t = 4)]
    ports: usize,

    /// How long to let the simulation run, in seconds
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    /// Pin the timer phase RNG for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Leave every engine stopped and inject one frame instead, to watch
    /// the flood relay walk the ring and the loop guard stop it
    #[arg(long)]
    stopped: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if cli.bridges < 2 {
        bail!("a LAN of {} bridge(s) has nothing to relay", cli.bridges);
    }
    if cli.ports < 3 {
        bail!("ring wiring plus an injection port needs at least 3 ports");
    }

    let mut builder = Simulation::builder();
    if let Some(seed) = cli.seed {
        builder = builder.seed(seed);
    }
    let (simulation, mut client) = builder.build().context("building simulation")?;
    let simulation_task = tokio::spawn(simulation.run());

    // Build the ring.
    let bridges = add_bridges(&mut client, cli.bridges, cli.ports).await?;
    for (i, bridge) in bridges.iter().enumerate() {
        let next = bridges[(i + 1) % bridges.len()];
        client
            .commands
            .send(Command::AddWire {
                end0: WireEnd::Connected(PortRef::new(*bridge, PortIndex(1))),
                end1: WireEnd::Connected(PortRef::new(next, PortIndex(0))),
            })
            .await
            .context("adding wire")?;
    }
    info!(bridges = bridges.len(), "ring topology built");

    if cli.stopped {
        let bytes = protocol_frame_bytes(MacAddr::new([0x02, 0xEE, 0, 0, 0, 0x01]), 8);
        client
            .commands
            .send(Command::InjectFrame { bridge: bridges[0], port: PortIndex(2), bytes })
            .await
            .context("injecting frame")?;
        info!("engines stopped; injected one protocol frame at bridge 0");
    } else {
        for bridge in &bridges {
            client
                .commands
                .send(Command::StartEngine { bridge: *bridge })
                .await
                .context("starting engine")?;
        }
        info!("spanning-tree engines started on every bridge");
    }

    // Watch the LAN for a while.
    observe(&mut client, Duration::from_secs(cli.seconds)).await;

    // Final snapshot.
    client.commands.send(Command::GetState).await.context("requesting state")?;
    let report = await_report(&mut client).await?;
    print_report(&report);

    client.commands.send(Command::Shutdown).await.ok();
    simulation_task.await.context("joining simulation task")?;
    Ok(())
}

/// Create `count` bridges and collect their assigned ids.
async fn add_bridges(client: &mut SimClient, count: u32, ports: usize) -> Result<Vec<BridgeId>> {
    for i in 0..count {
        let address = MacAddr::new([0x02, 0x00, 0x00, 0x00, i as u8, 0x00]);
        let config = BridgeConfig::new(address, ports, 0);
        client
            .commands
            .send(Command::AddBridge { config, x: (i as f32) * 120.0, y: 80.0 })
            .await
            .context("adding bridge")?;
    }

    let mut bridges = Vec::with_capacity(count as usize);
    while bridges.len() < count as usize {
        match timeout(EVENT_TIMEOUT, client.app_events.recv()).await {
            Ok(Some(AppEvent::BridgeAdded { bridge })) => bridges.push(bridge),
            Ok(Some(AppEvent::Error { message })) => bail!("bridge creation failed: {message}"),
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => bail!("simulation stopped before all bridges were created"),
        }
    }
    Ok(bridges)
}

/// Print interesting app events until the deadline passes.
async fn observe(client: &mut SimClient, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, client.app_events.recv()).await {
            Ok(Some(AppEvent::EngineLog { bridge, line })) => {
                info!(bridge = bridge.0, "{line}");
            }
            Ok(Some(AppEvent::LoopSuppressed { bridge, port })) => {
                warn!(bridge = bridge.0, port = port.0, "loop suppressed");
            }
            Ok(Some(AppEvent::PortRoleChanged { bridge, port, tree, role })) => {
                info!(bridge = bridge.0, port = port.0, tree, %role, "port role changed");
            }
            Ok(Some(AppEvent::Error { message })) => warn!("{message}"),
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => break,
        }
    }
}

async fn await_report(client: &mut SimClient) -> Result<StateReport> {
    loop {
        match timeout(EVENT_TIMEOUT, client.app_events.recv()).await {
            Ok(Some(AppEvent::StateReport(report))) => return Ok(report),
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => bail!("no state report from simulation"),
        }
    }
}

fn print_report(report: &StateReport) {
    info!(
        bridges = report.bridges.len(),
        wires = report.wires.len(),
        events = report.stats.events_processed,
        commands = report.stats.commands_processed,
        "final state",
    );
    for bridge in &report.bridges {
        info!(
            id = bridge.id.0,
            address = %bridge.address,
            started = bridge.started,
            relayed = bridge.stats.frames_relayed,
            suppressed = bridge.stats.loops_suppressed,
            bpdus = bridge.stats.bpdus_delivered,
            "bridge",
        );
        for port in &bridge.ports {
            info!(
                "  port {} {} {} role={}",
                port.index.0,
                port.address,
                if port.mac_operational { "up" } else { "down" },
                port.role,
            );
        }
    }
}

fn setup_logging(verbose: bool) {
    let log_level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
