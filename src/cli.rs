//! Command line interface and interactive shell
use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use crate::errors::{EmulatorError, ValidationError};
use crate::manager::{EmulatorManager, EmulatorStatus};
use crate::models::{Emulator, GeofenceEvent, Mdn};
use crate::storage::Delivery;

#[derive(Debug, Parser)]
#[command(name = "gps-emulator", version, about = "Vehicle GPS telemetry emulator")]
pub struct Cli {
    /// Configuration file; defaults to config/default.toml when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// One line typed into the interactive shell
#[derive(Debug, Parser)]
#[command(name = "emulator", no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Switch an emulator on and stream realtime GPS logs
    Start {
        mdn: Mdn,
        #[command(flatten)]
        device: DeviceArgs,
        /// Collect samples without sending them
        #[arg(long)]
        no_store: bool,
    },
    /// Switch an emulator off
    Stop { mdn: Option<Mdn> },
    /// Generate one minute of GPS logs, or start realtime collection
    Generate {
        mdn: Option<Mdn>,
        #[arg(long)]
        realtime: bool,
        #[arg(long)]
        no_store: bool,
    },
    /// Report a geofence crossing (enter or exit)
    Geofence {
        mdn: Mdn,
        group: u64,
        id: u64,
        event: GeofenceEvent,
    },
    /// Show logs waiting to be delivered
    Pending { mdn: Option<Mdn> },
    /// List emulators
    #[command(alias = "status")]
    List,
    /// Enter the interactive shell
    Interactive,
    /// Leave the interactive shell
    #[command(alias = "quit")]
    Exit,
}

/// Terminal registration values
#[derive(Debug, Clone, PartialEq, Args)]
pub struct DeviceArgs {
    #[arg(long, default_value_t = 1)]
    pub vehicle_id: u64,
    #[arg(long, default_value = "A001")]
    pub terminal_id: String,
    #[arg(long, default_value_t = 6)]
    pub manufacture_id: u32,
    #[arg(long, default_value_t = 5)]
    pub packet_version: u32,
    #[arg(long, default_value_t = 1)]
    pub device_id: u32,
    #[arg(long, default_value = "1.0.0")]
    pub firmware_version: String,
}

impl Default for DeviceArgs {
    fn default() -> Self {
        Self {
            vehicle_id: 1,
            terminal_id: "A001".to_string(),
            manufacture_id: 6,
            packet_version: 5,
            device_id: 1,
            firmware_version: "1.0.0".to_string(),
        }
    }
}

impl DeviceArgs {
    pub fn emulator(&self, mdn: Mdn) -> Result<Emulator, ValidationError> {
        Emulator::builder()
            .mdn(mdn)
            .vehicle_id(self.vehicle_id)
            .terminal_id(self.terminal_id.as_str())
            .manufacture_id(self.manufacture_id)
            .packet_version(self.packet_version)
            .device_id(self.device_id)
            .device_firmware_version(self.firmware_version.as_str())
            .build()
    }
}

/// Whether the caller should keep reading commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Executes commands against a manager, remembering the last started MDN
pub struct CommandRunner {
    manager: EmulatorManager,
    current: Option<Mdn>,
}

fn delivery_text(delivery: Option<Delivery>) -> &'static str {
    match delivery {
        Some(Delivery::Sent) => "sent",
        Some(Delivery::Queued) => "queued for retry",
        None => "not stored",
    }
}

fn format_status(status: &EmulatorStatus) -> String {
    format!(
        "{:<16} vehicle {:<6} {:<8} {:<9} ({:.6}, {:.6}) trip {} m{}",
        status.mdn,
        status.vehicle_id,
        if status.active { "ON" } else { "OFF" },
        if status.realtime { "realtime" } else { "-" },
        status.latitude,
        status.longitude,
        status.trip_meter,
        status
            .last_update
            .map(|t| format!(" updated {}", t.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_default()
    )
}

impl CommandRunner {
    pub fn new(manager: EmulatorManager) -> Self {
        Self {
            manager,
            current: None,
        }
    }

    pub fn current(&self) -> Option<Mdn> {
        self.current
    }

    fn target(&self, mdn: Option<Mdn>) -> Result<Mdn, EmulatorError> {
        mdn.or(self.current).ok_or_else(|| {
            EmulatorError::Cli("No MDN given and no emulator has been started".to_string())
        })
    }

    pub async fn execute(&mut self, command: Command) -> Result<Flow, EmulatorError> {
        match command {
            Command::Start {
                mdn,
                device,
                no_store,
            } => {
                let delivery = self.manager.start(device.emulator(mdn)?).await?;
                self.current = Some(mdn);
                println!("Emulator {mdn} started (power ON {})", delivery_text(Some(delivery)));
                self.manager.start_realtime(mdn, !no_store).await?;
                println!("Realtime GPS collection running for {mdn}");
            }
            Command::Stop { mdn } => {
                let mdn = self.target(mdn)?;
                let delivery = self.manager.stop(mdn).await?;
                println!("Emulator {mdn} stopped (power OFF {})", delivery_text(Some(delivery)));
            }
            Command::Generate {
                mdn,
                realtime,
                no_store,
            } => {
                let mdn = self.target(mdn)?;
                if !self.manager.exists(mdn).await {
                    self.manager
                        .start(DeviceArgs::default().emulator(mdn)?)
                        .await?;
                    self.current = Some(mdn);
                    println!("Emulator {mdn} started with default device settings");
                }

                if realtime {
                    if self.manager.start_realtime(mdn, !no_store).await? {
                        println!("Realtime GPS collection running for {mdn}");
                    } else {
                        println!("Realtime GPS collection already running for {mdn}");
                    }
                } else {
                    let (cycle, delivery) = self.manager.generate(mdn, !no_store).await?;
                    println!(
                        "Generated {} GPS logs for {mdn} ({})",
                        cycle.len(),
                        delivery_text(delivery)
                    );
                }
            }
            Command::Geofence {
                mdn,
                group,
                id,
                event,
            } => {
                let delivery = self.manager.geofence(mdn, group, id, event).await?;
                println!(
                    "Geofence {group}/{id} {event:?} for {mdn} ({})",
                    delivery_text(Some(delivery))
                );
            }
            Command::Pending { mdn } => match mdn.or(self.current) {
                Some(mdn) => {
                    let pending = self.manager.pending(mdn).await?;
                    println!("{} pending log(s) for {mdn}", pending.len());
                    for entry in pending {
                        println!(
                            "  {:<9} {} records, queued {}, retries {}",
                            entry.report.kind(),
                            entry.report.record_count(),
                            entry.queued_at.format("%Y-%m-%d %H:%M:%S"),
                            entry.retry_count
                        );
                    }
                }
                None => {
                    let summary = self.manager.storage().summary().await;
                    println!("{} pending log(s)", summary.total);
                    for (kind, count) in &summary.by_kind {
                        println!("  {kind:<9} {count}");
                    }
                    if let Some(oldest) = summary.oldest {
                        println!("  oldest queued {}", oldest.format("%Y-%m-%d %H:%M:%S"));
                    }
                }
            },
            Command::List => {
                let statuses = self.manager.list().await;
                if statuses.is_empty() {
                    println!("No emulators");
                }
                for status in &statuses {
                    println!("{}", format_status(status));
                }
            }
            Command::Interactive => {
                println!("Already in interactive mode");
            }
            Command::Exit => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }

    /// Read commands from stdin until `exit`, end of input or Ctrl-C
    pub async fn interactive(&mut self) -> Result<(), EmulatorError> {
        println!("GPS emulator interactive mode. Type 'help' for commands, 'exit' to quit.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let prompt = match self.current {
                Some(mdn) => format!("emulator [{mdn}]> "),
                None => "emulator> ".to_string(),
            };
            print!("{prompt}");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };

            let words: Vec<&str> = line.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }

            match ShellLine::try_parse_from(words) {
                Ok(parsed) => match self.execute(parsed.command).await {
                    Ok(Flow::Exit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => eprintln!("Error ({}): {}", e.status_code(), e),
                },
                Err(e) => e.print()?,
            }
        }

        println!();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gps-emulator").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_start_with_device_options() {
        let cli = parse(&["start", "01012345678", "--vehicle-id", "7", "--terminal-id", "B002"]);
        match cli.command {
            Some(Command::Start {
                mdn,
                device,
                no_store,
            }) => {
                assert_eq!(mdn.value(), 1012345678);
                assert_eq!(device.vehicle_id, 7);
                assert_eq!(device.terminal_id, "B002");
                assert_eq!(device.manufacture_id, 6);
                assert!(!no_store);

                let emulator = device.emulator(mdn).unwrap();
                assert_eq!(emulator.terminal_id(), "B002");
                assert_eq!(emulator.device_firmware_version(), "1.0.0");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_optional_mdn_and_flags() {
        assert_eq!(
            parse(&["generate", "--realtime", "--no-store"]).command,
            Some(Command::Generate {
                mdn: None,
                realtime: true,
                no_store: true
            })
        );
        assert_eq!(parse(&["stop"]).command, Some(Command::Stop { mdn: None }));
        assert_eq!(parse(&["status"]).command, Some(Command::List));
        assert_eq!(parse(&[]).command, None);
    }

    #[test]
    fn parses_geofence_event() {
        assert_eq!(
            parse(&["geofence", "1012345678", "3", "11", "exit"]).command,
            Some(Command::Geofence {
                mdn: Mdn::try_from(1012345678).unwrap(),
                group: 3,
                id: 11,
                event: GeofenceEvent::Exit
            })
        );
    }

    #[test]
    fn rejects_invalid_mdn() {
        let result = Cli::try_parse_from(["gps-emulator", "start", "12ab"]);
        assert!(result.is_err());
    }

    #[test]
    fn shell_line_without_binary_name() {
        let line = ShellLine::try_parse_from(["quit"]).unwrap();
        assert_eq!(line.command, Command::Exit);

        let line = ShellLine::try_parse_from(["pending", "1012345678"]).unwrap();
        assert_eq!(
            line.command,
            Command::Pending {
                mdn: Some(Mdn::try_from(1012345678).unwrap())
            }
        );
    }

    #[test]
    fn default_device_matches_cli_defaults() {
        let cli = parse(&["start", "1012345678"]);
        let Some(Command::Start { device, .. }) = cli.command else {
            panic!("expected start");
        };
        assert_eq!(device, DeviceArgs::default());
    }
}
