//! HuePair - pair two devices by showing and scanning a color sequence
//!
//! One device opens a session and displays its sequence; another films it,
//! reports what it saw, and proves freshness with a time-bucketed challenge.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use huepair_auth::SessionStore;
use huepair_core::{Config, Symbol};
use huepair_server::{create_router, AppState, ServerCertificate};
use rand::RngCore;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// HuePair - color-sequence device pairing server
#[derive(Parser, Debug)]
#[command(name = "huepair")]
#[command(version, about, long_about = None)]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "3000", env = "HUEPAIR_PORT")]
    port: u16,

    /// Shared secret challenges are derived from (random per run if unset)
    #[arg(long, env = "HUEPAIR_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Challenge window in seconds
    #[arg(short, long, default_value = "30")]
    window: u64,

    /// Symbols sequences are drawn from
    #[arg(short, long, default_value = "RGB")]
    alphabet: String,

    /// Steps per sequence
    #[arg(short, long, default_value = "4")]
    length: usize,

    /// Minimum similarity for a fuzzy match (0.0-1.0)
    #[arg(long, default_value = "0.5")]
    fuzzy_floor: f64,

    /// Buckets a challenge response may lag or lead the current one
    #[arg(long, default_value = "1")]
    tolerance: u64,

    /// Seconds of inactivity before a session is dropped
    #[arg(long, default_value = "300")]
    session_timeout: u64,

    /// Seconds between idle sweeps
    #[arg(long, default_value = "30")]
    sweep_interval: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable HTTPS (mobile browsers only allow camera access over a secure context)
    #[arg(long)]
    no_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long, requires = "key")]
    cert: Option<String>,

    /// Path to TLS private key file (PEM format)
    #[arg(long, requires = "cert")]
    key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("HuePair v{}", env!("CARGO_PKG_VERSION"));

    let secret = match args.secret {
        Some(secret) => secret,
        None => {
            warn!("No shared secret configured; generating one for this run");
            generate_secret()
        }
    };

    let alphabet = Symbol::parse_alphabet(&args.alphabet).context("invalid alphabet")?;

    let config = Config::new()
        .with_secret(secret)
        .with_port(args.port)
        .with_window_secs(args.window)
        .with_alphabet(alphabet)
        .with_sequence_length(args.length)
        .with_fuzzy_floor(args.fuzzy_floor)
        .with_replay_tolerance(args.tolerance)
        .with_session_timeout_secs(args.session_timeout)
        .with_sweep_interval_secs(args.sweep_interval);
    config.validate().context("invalid configuration")?;

    let store = Arc::new(SessionStore::new(&config)?);

    // Setup TLS
    let certificate = if args.no_tls {
        warn!("TLS disabled; browsers will refuse camera access outside localhost");
        None
    } else if let (Some(cert), Some(key)) = (&args.cert, &args.key) {
        Some(ServerCertificate::load(Path::new(cert), Path::new(key))?)
    } else {
        let hostnames = get_local_ip().into_iter().collect::<Vec<_>>();
        Some(ServerCertificate::self_signed(&hostnames)?)
    };

    let tls_config = match &certificate {
        Some(cert) => Some(cert.rustls_config().await?),
        None => None,
    };
    let cert_fingerprint = certificate.map(|c| c.fingerprint);

    let state = Arc::new(AppState::new(
        config.clone(),
        store.clone(),
        cert_fingerprint.clone(),
    ));

    // Drop sessions whose initiator never came back
    let sweep_state = state.clone();
    let sweep_every = config.sweep_interval();
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            let expired = sweep_state.store.sweep_idle(Utc::now()).await;
            if !expired.is_empty() {
                info!("Expired {} idle session(s)", expired.len());
                sweep_state.notify_closed(&expired, "Session expired").await;
            }
        }
    });

    let router = create_router(state);

    let local_ip = get_local_ip().unwrap_or_else(|| "localhost".to_string());
    let protocol = if tls_config.is_some() { "https" } else { "http" };

    info!("Starting server on port {}...", config.port);
    info!("");
    info!("  Access URL: {}://{}:{}", protocol, local_ip, config.port);
    if let Some(ref fp) = cert_fingerprint {
        info!("  Cert fingerprint: {}", fp);
        info!("");
        info!("  NOTE: You may need to accept the self-signed certificate in your browser.");
    }
    info!(
        "  Sequences: {} steps over {:?}, challenge window {}s",
        config.sequence_length,
        args.alphabet,
        config.window_secs
    );
    info!("  Idle sessions expire after {}s", config.session_timeout_secs);
    info!("");
    info!("Press Ctrl+C to stop.");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    if let Some(tls_config) = tls_config {
        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();

        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(router.into_make_service())
            .await?;
    } else {
        let shutdown = async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        };

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
    }

    sweep_handle.abort();

    info!("Goodbye!");
    Ok(())
}

/// 32 random bytes, hex encoded
fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Get the local IP address
fn get_local_ip() -> Option<String> {
    use std::net::UdpSocket;

    // Connecting a UDP socket sends nothing but picks the outbound interface
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    Some(addr.ip().to_string())
}
