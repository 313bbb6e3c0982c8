//! babelcast command-line client.
//!
//! Subcommands:
//! - `babelcast send` - stream the microphone to the relay as the technician
//! - `babelcast listen <channel>` - play a channel; type a key to switch
//! - `babelcast monitor` - hear your own microphone through the playback path
//! - `babelcast config` - show the effective configuration
//! - `babelcast store-secret` - save the sender secret in the OS keychain

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use babelcast::{
    auth::{
        Credential, CredentialAcquirer, KeyringStore, NoSecureStore, Prompter, SecureStore,
        TerminalPrompter,
    },
    config::{AppConfig, AppPaths},
    playback::CpalOutputFactory,
    session::{
        new_shared_status, open_microphone, run_sender, ListenerCoordinator, SessionContext,
        SharedStatus,
    },
    transport::{
        ChannelKey, ConnectionEstablisher, Connector, MemoryTransport, Role, Transport,
        TransportError,
    },
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "babelcast")]
#[command(about = "Live interpretation audio relay client")]
#[command(version)]
struct Cli {
    /// Path to settings.toml (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Relay base URL, e.g. ws://relay.local:8000
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the microphone to the relay (technician role)
    Send,

    /// Listen to a channel
    Listen {
        /// Channel key to join first (e.g. en)
        channel: String,

        /// Acquire the sender credential for each listener connection
        #[arg(long)]
        auth: bool,
    },

    /// Play the microphone locally through the listener path, no relay
    Monitor,

    /// Print the settings file location and the effective configuration
    Config,

    /// Store the sender secret in the OS keychain
    ///
    /// On Linux the secret goes to the kernel keyring, which keeps it only
    /// until the next reboot; run this again after restarting.
    StoreSecret {
        /// Identity to store the secret for (defaults to the configured one)
        #[arg(short, long)]
        identity: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(|| AppPaths::new().settings_file);
    let mut config = AppConfig::load_from(&settings_path)
        .with_context(|| format!("reading {}", settings_path.display()))?;
    if let Some(server) = cli.server {
        config.server.url = server;
    }

    // The sender's cpal stream is !Send, so sessions run via block_on on
    // this thread; listener tasks use the worker pool.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    match cli.command {
        Commands::Send => send(&rt, &config),
        Commands::Listen { channel, auth } => rt.block_on(listen(config, &channel, auth)),
        Commands::Monitor => rt.block_on(monitor(config)),
        Commands::Config => {
            println!("# {}", settings_path.display());
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::StoreSecret { identity } => store_secret(config, &settings_path, identity),
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn send(rt: &tokio::runtime::Runtime, config: &AppConfig) -> Result<()> {
    let status = new_shared_status();
    let acquirer = build_acquirer(config);
    let connector = ConnectionEstablisher::new(config.server.clone());

    let result = rt.block_on(run_sender(
        config,
        &acquirer,
        &connector,
        &status,
        shutdown_signal(),
    ));
    report(&status);
    Ok(result?)
}

async fn listen(config: AppConfig, first: &str, with_auth: bool) -> Result<()> {
    let credentials = with_auth.then(|| Arc::new(build_acquirer(&config)));

    let status = new_shared_status();
    let mut coordinator = ListenerCoordinator::new(SessionContext {
        connector: Arc::new(ConnectionEstablisher::new(config.server.clone())),
        outputs: Arc::new(CpalOutputFactory::new(config.playback.output_device.clone())),
        status: status.clone(),
        credentials,
        config: config.clone(),
    });

    switch(&mut coordinator, &config, first).await;
    eprintln!("type a channel key to switch, `stop` to leave, `status`, or `quit`");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match ListenCommand::parse(&line) {
                    ListenCommand::Quit => break,
                    ListenCommand::Stop => {
                        coordinator.stop().await?;
                        report(&status);
                    }
                    ListenCommand::Status => report(&status),
                    ListenCommand::Switch(key) => switch(&mut coordinator, &config, &key).await,
                    ListenCommand::Nothing => {}
                },
                // keep playing until Ctrl-C once stdin is gone
                Ok(None) => stdin_open = false,
                Err(e) => {
                    log::warn!("session: stdin unreadable ({e}); use Ctrl-C to quit");
                    stdin_open = false;
                }
            },
        }
    }

    coordinator.stop().await?;
    Ok(())
}

async fn switch(coordinator: &mut ListenerCoordinator, config: &AppConfig, key: &str) {
    let channel = match ChannelKey::new(key) {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };
    if !config.knows_channel(channel.as_str()) {
        log::warn!(
            "session: {channel} is not in the configured channels {:?}",
            config.channels
        );
    }
    if let Err(e) = coordinator.switch_to(channel).await {
        eprintln!("{e}");
    }
    report(coordinator.status());
}

async fn monitor(config: AppConfig) -> Result<()> {
    let capture_status = new_shared_status();
    let mut pipeline = open_microphone(&config.audio, capture_status.clone())?;
    let (mut sender_end, listener_end) = MemoryTransport::pair();

    let mut coordinator = ListenerCoordinator::new(SessionContext {
        connector: Arc::new(LoopbackConnector::new(listener_end)),
        outputs: Arc::new(CpalOutputFactory::new(config.playback.output_device.clone())),
        status: new_shared_status(),
        credentials: None,
        config: config.clone(),
    });
    coordinator.join(ChannelKey::new("monitor")?).await?;
    eprintln!("monitoring the microphone, Ctrl-C to stop");

    let result = pipeline.run(&mut sender_end, shutdown_signal()).await;
    coordinator.stop().await?;
    report(&capture_status);
    result?;
    Ok(())
}

fn store_secret(
    mut config: AppConfig,
    settings_path: &std::path::Path,
    identity: Option<String>,
) -> Result<()> {
    let identity = identity
        .or_else(|| config.auth.identity.clone())
        .unwrap_or_else(|| config.auth.default_identity.clone());

    let secret = TerminalPrompter
        .secret(&identity)?
        .filter(|s| !s.is_empty())
        .context("no secret entered")?;

    KeyringStore::new(config.auth.keyring_service.clone())
        .save(&Credential::new(identity.clone(), secret))?;

    if config.auth.identity.is_none() {
        config.auth.identity = Some(identity.clone());
        config.save_to(settings_path)?;
        log::info!("auth: {identity:?} set as the configured identity");
    }
    println!("secret stored for {identity}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_acquirer(config: &AppConfig) -> CredentialAcquirer {
    let store: Box<dyn SecureStore> = if config.auth.use_keyring {
        Box::new(KeyringStore::new(config.auth.keyring_service.clone()))
    } else {
        Box::new(NoSecureStore)
    };
    CredentialAcquirer::new(
        store,
        Box::new(TerminalPrompter),
        config.auth.identity.clone(),
        config.auth.default_identity.clone(),
    )
}

/// Resolves on Ctrl-C.  If the handler cannot be installed it never
/// resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("session: cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

fn report(status: &SharedStatus) {
    let line = status
        .lock()
        .map(|b| {
            format!(
                "{} ({} sent, {} received, {} dropped)",
                b.summary(),
                b.blocks_sent,
                b.blocks_received,
                b.blocks_dropped
            )
        })
        .unwrap_or_else(|_| "status unavailable".into());
    eprintln!("{line}");
}

// ---------------------------------------------------------------------------
// ListenCommand
// ---------------------------------------------------------------------------

/// One line typed while listening.
#[derive(Debug, PartialEq)]
enum ListenCommand {
    Switch(String),
    Stop,
    Status,
    Quit,
    Nothing,
}

impl ListenCommand {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "" => ListenCommand::Nothing,
            "stop" | "leave" => ListenCommand::Stop,
            "status" => ListenCommand::Status,
            "quit" | "exit" | "q" => ListenCommand::Quit,
            key => ListenCommand::Switch(key.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// LoopbackConnector
// ---------------------------------------------------------------------------

/// Hands out one pre-built in-memory transport, for `monitor`.
struct LoopbackConnector(Mutex<Option<MemoryTransport>>);

impl LoopbackConnector {
    fn new(end: MemoryTransport) -> Self {
        Self(Mutex::new(Some(end)))
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(
        &self,
        _credential: Option<Credential>,
        _role: &Role,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let end = self
            .0
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or_else(|| TransportError::ConnectionError("loopback already in use".into()))?;
        Ok(Box::new(end))
    }
}
