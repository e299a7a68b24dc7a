//! MQTT Resubscriber - Main Entry Point
//!
//! Connects, subscribes and prints every arriving message until the operator
//! quits or the broker stays unreachable past the retry budget.

use clap::{Parser, Subcommand};
use mqtt_resubscriber::config::{ClientConfig, Overrides};
use mqtt_resubscriber::observability::init_logging_with_verbosity;
use mqtt_resubscriber::session::{LogSink, Session};
use mqtt_resubscriber::transport::{event_channel, MqttTransport};
use mqtt_resubscriber::SessionError;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

/// Resilient MQTT subscriber
#[derive(Parser)]
#[command(name = "mqtt-resubscriber")]
#[command(about = "MQTT subscriber that reconnects and resubscribes across broker outages")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the subscriber session
    Run(RunArgs),
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(clap::Args, Default)]
struct RunArgs {
    /// Broker URI, e.g. tcp://localhost:1883
    #[arg(long, env = "MQTT_SERVER")]
    server: Option<String>,

    /// Client identity presented to the broker
    #[arg(long, env = "MQTT_CLIENT_ID")]
    client_id: Option<String>,

    /// Topic to subscribe to; repeat for several
    #[arg(long = "topic", value_name = "TOPIC")]
    topics: Vec<String>,

    /// QoS level for every subscription
    #[arg(long)]
    qos: Option<u8>,

    /// Failed attempts tolerated before giving up
    #[arg(long)]
    max_retries: Option<u32>,
}

impl From<RunArgs> for Overrides {
    fn from(args: RunArgs) -> Self {
        Overrides {
            server_uri: args.server,
            client_id: args.client_id,
            topics: args.topics,
            qos: args.qos,
            max_attempts: args.max_retries,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging_with_verbosity(cli.verbose);

    info!("Starting MQTT Resubscriber v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run(args) => {
            config.apply_overrides(args.into());
            run_session(config).await
        }
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        let code = e
            .downcast_ref::<SessionError>()
            .map_or(1, SessionError::exit_code);
        process::exit(code);
    }

    info!("Exiting");
    // A pending blocking stdin read would otherwise hold up runtime shutdown
    process::exit(0);
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ClientConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["subscriber.toml", "config/subscriber.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(ClientConfig::load_from_file(&path)?);
                }
            }

            info!("No configuration file found, using built-in defaults");
            Ok(ClientConfig::default())
        }
    }
}

async fn run_session(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session_config = config.session_config()?;
    info!(
        server_uri = %session_config.server_uri,
        client_id = %session_config.client_id,
        topics = ?session_config.topics,
        "Session configured"
    );

    let (events_tx, events_rx) = event_channel();
    let transport = MqttTransport::new(&session_config, &config.mqtt, events_tx)
        .await
        .map_err(|e| SessionError::connect_start(&session_config.server_uri, e))?;

    let mut handle = Session::new(session_config, transport, events_rx, Arc::new(LogSink))
        .start()
        .await?;

    println!("Press Q<Enter> to quit\n");

    let outcome = tokio::select! {
        reason = wait_for_quit() => {
            info!("{}, shutting down", reason?);
            handle.request_shutdown().await
        }
        state = handle.terminated() => {
            warn!(%state, "Session ended on its own");
            handle.join().await
        }
    };

    outcome.map_err(Into::into)
}

/// Resolve when the operator asks to quit; the value says how
async fn wait_for_quit() -> std::io::Result<&'static str> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = sigint.recv() => return Ok("Received SIGINT"),
            _ = sigterm.recv() => return Ok("Received SIGTERM"),
            line = lines.next_line() => match line? {
                Some(line) if is_quit_command(&line) => return Ok("Quit requested"),
                Some(_) => {}
                None => return Ok("Console closed"),
            },
        }
    }
}

fn is_quit_command(line: &str) -> bool {
    matches!(line.chars().next(), Some('q') | Some('Q'))
}

fn handle_config_command(
    config: ClientConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
