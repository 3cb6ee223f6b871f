//! CLI application for the billiard hall lighting module.
//!
//! Run with: cargo run --example hall_cli -- --help

use clap::{Parser, Subcommand};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use cuehall_lights::{
    Controller, ControllerConfig, LightId, MODULE_PORT, PowerState, PresetName, PresetOutcome,
    discover_modules,
};

#[derive(Parser)]
#[command(name = "hall-cli")]
#[command(about = "Drive the billiard hall lights from the command line", long_about = None)]
struct Cli {
    /// IP address of the lighting module (not required for discover command)
    #[arg(short, long, global = true)]
    ip: Option<Ipv4Addr>,

    /// Request timeout in milliseconds
    #[arg(long, global = true, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find lighting modules on the network
    Discover {
        /// Discovery timeout in seconds (default: 5)
        #[arg(short, long, default_value = "5")]
        timeout: u64,
    },

    /// List every light
    Lights,

    /// Show module status and the dashboard summary
    Status,

    /// Turn a light on
    On { light: u16 },

    /// Turn a light off
    Off { light: u16 },

    /// Toggle a light on/off
    Toggle { light: u16 },

    /// Set brightness (0-100)
    Brightness { light: u16, level: i64 },

    /// Apply a preset: all_on, all_off, tables_only, ambient
    Preset { name: String },

    /// Watch the hall, printing the light table on every poll
    Watch {
        /// Poll interval in seconds
        #[arg(short, long, default_value = "5")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Discover { timeout } = cli.command {
        println!("Discovering lighting modules (timeout: {}s)...", timeout);
        let modules = discover_modules(Duration::from_secs(timeout)).await?;
        if modules.is_empty() {
            println!("No modules found on the network.");
        } else {
            println!("\nFound {} module(s):", modules.len());
            for module in modules {
                println!(
                    "  IP: {:15}  ID: {}  MAC: {}",
                    module.ip.to_string(),
                    module.module_id,
                    module.mac
                );
            }
        }
        return Ok(());
    }

    // All other commands require an IP address
    let ip = cli.ip.ok_or("IP address is required for this command. Use --ip <IP>")?;
    let config = ControllerConfig {
        request_timeout: Duration::from_millis(cli.timeout_ms),
        ..ControllerConfig::default()
    };
    let controller = Arc::new(Controller::udp((ip, MODULE_PORT).into(), config));
    controller.refresh().await?;

    match cli.command {
        Commands::Discover { .. } => unreachable!(),

        Commands::Lights => print_lights(&controller),

        Commands::Status => {
            let status = controller.module_status();
            println!("\nModule Status:");
            println!("{}", serde_json::to_string_pretty(&status)?);
            if let Some(rate) = status.success_rate() {
                println!("  Success rate: {:.1}%", rate);
            }
            println!("\nSummary:");
            println!("{}", serde_json::to_string_pretty(&controller.summary())?);
        }

        Commands::On { light } => {
            match controller.set_power(LightId(light), PowerState::On).await {
                Ok(state) => println!("Light {} is on at {}", light, state.brightness),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Off { light } => {
            match controller.set_power(LightId(light), PowerState::Off).await {
                Ok(_) => println!("Light {} is off", light),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Toggle { light } => match controller.toggle(LightId(light)).await {
            Ok(state) => println!("Light {} toggled {}", light, state.power),
            Err(e) => eprintln!("Error: {}", e),
        },

        Commands::Brightness { light, level } => {
            match controller.set_brightness(LightId(light), level).await {
                Ok(state) => println!("Light {} brightness set to {}", light, state.brightness),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Preset { name } => match controller.apply_preset(&name).await {
            Ok(PresetOutcome::FullySucceeded) => println!("Preset '{}' applied", name),
            Ok(PresetOutcome::PartiallyFailed(failures)) => {
                eprintln!("Preset '{}' applied with {} failure(s):", name, failures.len());
                for (light, e) in failures {
                    eprintln!("  light {}: {}", light, e);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                let names: Vec<String> =
                    PresetName::catalog().iter().map(ToString::to_string).collect();
                eprintln!("Available presets: {}", names.join(", "));
            }
        },

        Commands::Watch { interval } => {
            let interval = Duration::from_secs(interval);
            let mut tasks = controller.start();
            println!("Watching the hall... (Press Ctrl+C to stop)\n");
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = tokio::time::sleep(interval) => {
                        let snapshot = controller.query().await;
                        if snapshot.is_stale() {
                            println!("(module unreachable, showing last-known state)");
                        }
                        print_lights(&controller);
                        println!();
                    }
                }
            }
            tasks.stop();
        }
    }

    Ok(())
}

fn print_lights(controller: &Controller) {
    for light in controller.lights() {
        println!(
            "  {:>3}  {:20} {:8} {:3} {:3}%{}{}",
            light.id.value(),
            light.name,
            light.zone.as_ref(),
            light.status.as_ref(),
            light.brightness,
            if light.pending { "  (pending)" } else { "" },
            if light.reachable { "" } else { "  (unreachable)" },
        );
    }
}
