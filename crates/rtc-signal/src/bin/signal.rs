//! RTC Signal Relay
//!
//! WebRTC signaling relay with WebSocket push and HTTP polling.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (0.0.0.0:8000, 30 minute mailbox TTL)
//! rtc-signal
//!
//! # Custom port and config file
//! rtc-signal --port 9000 --config /etc/rtc-signal/signal.toml
//!
//! # Print a sample config
//! rtc-signal --print-config
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rtc_signal::{SignalConfig, SignalServer};

#[derive(Parser, Debug)]
#[command(name = "rtc-signal")]
#[command(about = "WebRTC signaling relay")]
#[command(version)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "RTC_SIGNAL_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(short, long, env = "RTC_SIGNAL_BIND")]
    bind: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long, env = "RTC_SIGNAL_PORT")]
    port: Option<u16>,

    /// Idle seconds before a peer mailbox is evicted
    #[arg(long, env = "RTC_SIGNAL_PEER_TTL_SECS")]
    peer_ttl_secs: Option<u64>,

    /// Seconds between mailbox sweeps
    #[arg(long, env = "RTC_SIGNAL_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "RTC_SIGNAL_JSON_LOGS")]
    json_logs: bool,

    /// Print a sample config and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, config: &mut SignalConfig) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ttl) = self.peer_ttl_secs {
            config.mailbox.peer_ttl_secs = ttl;
        }
        if let Some(interval) = self.sweep_interval_secs {
            config.mailbox.sweep_interval_secs = interval;
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", SignalConfig::sample());
        return Ok(());
    }

    init_logging(args.json_logs);

    let mut config = SignalConfig::load(args.config.as_deref())
        .with_context(|| format!("failed to load config {:?}", args.config))?;
    args.apply(&mut config);

    info!("Starting RTC Signal Server");
    info!(
        "Mailbox TTL {}s, sweep every {}s",
        config.mailbox.peer_ttl_secs, config.mailbox.sweep_interval_secs
    );

    let addr = config.listen_addr();
    SignalServer::new(config)
        .serve()
        .await
        .with_context(|| format!("signal server on {} failed", addr))?;

    info!("Signal server stopped");
    Ok(())
}
