use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roster_core::Extractor;
use serde_json::Value;

mod descriptor_file;

use descriptor_file::PrecomputedExtractor;

#[zbus::proxy(
    interface = "org.freedesktop.Roster1",
    default_service = "org.freedesktop.Roster1",
    default_path = "/org/freedesktop/Roster1"
)]
trait Roster {
    async fn enroll(&self, name: &str, descriptor: Vec<f64>) -> zbus::Result<String>;
    async fn recognize(&self, descriptor: Vec<f64>) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn history(&self, identity_id: i64, limit: u32) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "roster", about = "Roster face attendance CLI")]
struct Cli {
    /// Talk to rosterd on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    /// Extractor model that produced the descriptor files
    #[arg(long, global = true, default_value = "Facenet")]
    model: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new identity from a descriptor file
    Enroll {
        /// Display name (e.g., "Alice")
        #[arg(short, long)]
        name: String,
        /// Descriptor file (.json array or raw little-endian f32)
        descriptor: PathBuf,
    },
    /// Recognize a descriptor and record attendance
    Recognize {
        /// Descriptor file (.json array or raw little-endian f32)
        descriptor: PathBuf,
    },
    /// List enrolled identities
    List,
    /// Show recent attendance for an identity
    History {
        /// Identity ID
        id: i64,
        /// Maximum number of events
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("cannot connect to D-Bus")?;
    let proxy = RosterProxy::new(&conn)
        .await
        .context("rosterd not available")?;

    let mut extractor = PrecomputedExtractor::new(cli.model);

    match cli.command {
        Commands::Enroll { name, descriptor } => {
            let values = load_descriptor(&mut extractor, &descriptor)?;
            let reply = proxy.enroll(&name, values).await?;
            let identity: Value = serde_json::from_str(&reply)?;
            println!(
                "Enrolled {} (id {})",
                identity["name"].as_str().unwrap_or("?"),
                identity["id"]
            );
        }
        Commands::Recognize { descriptor } => {
            let values = load_descriptor(&mut extractor, &descriptor)?;
            let reply = proxy.recognize(values).await?;
            let outcome: Value = serde_json::from_str(&reply)?;
            println!("{}", describe_outcome(&outcome));
        }
        Commands::List => {
            let reply = proxy.list_identities().await?;
            let identities: Value = serde_json::from_str(&reply)?;
            match identities.as_array() {
                Some(list) if !list.is_empty() => {
                    for identity in list {
                        println!("{:>6}  {}", identity["id"], identity["name"].as_str().unwrap_or(""));
                    }
                }
                _ => println!("No identities enrolled"),
            }
        }
        Commands::History { id, limit } => {
            let reply = proxy.history(id, limit).await?;
            let events: Value = serde_json::from_str(&reply)?;
            match events.as_array() {
                Some(list) if !list.is_empty() => {
                    for event in list {
                        println!(
                            "{}  {}",
                            event["timestamp"].as_str().unwrap_or("?"),
                            event["category"].as_str().unwrap_or("?")
                        );
                    }
                }
                _ => println!("No attendance recorded for {id}"),
            }
        }
        Commands::Status => {
            let reply = proxy.status().await?;
            let status: Value = serde_json::from_str(&reply)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

/// Read a descriptor file. An empty descriptor is sent as an empty array,
/// which the daemon reads as "no face detected".
fn load_descriptor(extractor: &mut PrecomputedExtractor, path: &Path) -> Result<Vec<f64>> {
    let descriptor = extractor.extract(path)?;
    tracing::debug!(
        path = %path.display(),
        model = extractor.model(),
        dim = ?descriptor.as_ref().map(|d| d.dim()),
        "descriptor loaded"
    );
    Ok(descriptor
        .map(|d| d.values().iter().map(|&v| f64::from(v)).collect())
        .unwrap_or_default())
}

/// One line of user feedback per recognition outcome.
fn describe_outcome(outcome: &Value) -> String {
    match outcome["outcome"].as_str() {
        Some("matched") => {
            let name = outcome["identity"]["name"].as_str().unwrap_or("?");
            match outcome["event"]["category"].as_str() {
                Some(category) => format!("{name}: {category} recorded"),
                None => format!("{name}: already recorded"),
            }
        }
        Some("unmatched") => "No enrolled identity matched".to_string(),
        Some("no_face_detected") => "No face detected, try again".to_string(),
        _ => format!("Unexpected reply: {outcome}"),
    }
}
