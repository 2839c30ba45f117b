use clap::Parser;
use pultrusion::console::{self, ConsoleCommand};
use pultrusion::{
    connection_params, init_logging, load_config, memory_link, resolve_port, rig_defaults,
    rig_timings, Rig, SimulatedDevice, SimulatorConfig, BUILD_DATE, VERSION,
};
use pultrusion_communication::stop_channel;
use pultrusion_core::{Error, EventFilter, RigEvent};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Serial controller for a filament pultrusion rig
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Serial port (e.g. COM3, /dev/ttyACM0); overrides the config file
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate; overrides the config file
    #[arg(short, long)]
    baud: Option<u32>,

    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against a simulated device instead of a serial port
    #[arg(long)]
    simulate: bool,

    /// List candidate serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json)?;
    tracing::info!("pultrusion {} (built {})", VERSION, BUILD_DATE);

    if args.list_ports {
        let ports = pultrusion::list_ports()?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port);
        }
        return Ok(());
    }

    let mut config = load_config(args.config.as_deref())?;
    if let Some(baud) = args.baud {
        config.connection.baud_rate = baud;
        config.validate()?;
    }

    let timings = rig_timings(&config);
    let defaults = rig_defaults(&config);

    let (sim_stop, sim_signal) = stop_channel();
    let (rig, simulator) = if args.simulate {
        let (link, device) = memory_link("simulator");
        let simulator =
            SimulatedDevice::new(device, SimulatorConfig::default()).spawn(sim_signal);
        (Rig::with_link(link, timings, defaults), Some(simulator))
    } else {
        let port = resolve_port(&config, args.port.as_deref())?;
        let params = connection_params(&config, &port);
        match Rig::connect(&params, timings, defaults).await {
            Ok(rig) => (rig, None),
            Err(e) => {
                let error = Error::from(e);
                tracing::error!("{}", error);
                return Err(error.into());
            }
        }
    };

    println!("Connected to {}. Type 'help' for commands.", rig.port_name());
    let outcome = run_console(&rig).await;

    rig.shutdown().await;
    sim_stop.stop();
    if let Some(simulator) = simulator {
        simulator.await.ok();
    }
    Ok(outcome?)
}

async fn run_console(rig: &Rig) -> Result<(), Error> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut events = rig.events(EventFilter::All);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Console input failed: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => match console::execute(rig, command) {
                        Ok(reply) => println!("{}", reply),
                        Err(e) => {
                            if let Some(text) = console::report(e)? {
                                println!("{}", text);
                            }
                        }
                    },
                    Err(e) => println!("{}", e),
                }
            }
            event = events.next() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }
    Ok(())
}

fn print_event(event: &RigEvent) {
    if let Some(text) = console::event_line(event) {
        println!("{}", text);
    }
}
