mod client;
mod commands;
mod config;
mod events;

use client::{ClientCommand, ClientSettings};
use config::{BotConfig, Config};
use events::ClientEvent;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/lodestone.toml".into());
    let config = Config::load(Path::new(&config_path))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.log.level.to_lowercase())
            }),
        )
        .init();

    info!(
        "Starting lodestone: server {}:{}, protocol {}",
        config.server.host, config.server.port, config.server.protocol_version
    );

    let bots = if config.bots.is_empty() {
        vec![BotConfig {
            username: "lodestone".into(),
            uuid: None,
            view_distance: 8,
        }]
    } else {
        config.bots.clone()
    };

    let mut command_txs: HashMap<String, mpsc::UnboundedSender<ClientCommand>> = HashMap::new();
    let mut tasks = tokio::task::JoinSet::new();

    for (i, bot) in bots.iter().enumerate() {
        let settings = ClientSettings {
            host: config.server.host.clone(),
            port: config.server.port,
            protocol_version: config.server.protocol_version,
            username: bot.username.clone(),
            uuid: bot.uuid,
            view_distance: bot.view_distance,
            keep_alive_interval: Duration::from_millis(config.supervisor.keep_alive_interval_ms),
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        command_txs.insert(bot.username.clone(), command_tx);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(log_events(bot.username.clone(), event_rx));

        // Stagger startups so a fleet does not hammer the server at
        // the same instant.
        let stagger = Duration::from_millis(config.supervisor.spawn_stagger_ms * i as u64);
        let reconnect_delay = Duration::from_millis(config.supervisor.reconnect_delay_ms);
        let max_attempts = config.supervisor.max_reconnect_attempts;
        tasks.spawn(supervise_client(
            settings,
            reconnect_delay,
            max_attempts,
            stagger,
            event_tx,
            command_rx,
        ));
    }

    tokio::spawn(command_loop(command_txs));

    let mut any_failed = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                std::process::exit(130);
            }
            joined = tasks.join_next() => match joined {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    error!("Client failed: {:#}", e);
                    any_failed = true;
                }
                Some(Err(e)) => {
                    error!("Client task panicked: {}", e);
                    any_failed = true;
                }
                None => break,
            }
        }
    }
    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Run one client with the reconnect policy: fixed delay, capped
/// attempt count, errors surfaced when the cap is exhausted.
async fn supervise_client(
    settings: ClientSettings,
    reconnect_delay: Duration,
    max_attempts: u32,
    stagger: Duration,
    events: mpsc::UnboundedSender<ClientEvent>,
    mut commands: mpsc::UnboundedReceiver<ClientCommand>,
) -> anyhow::Result<()> {
    tokio::time::sleep(stagger).await;
    let mut attempts = 0u32;
    loop {
        match client::run(settings.clone(), events.clone(), &mut commands).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempts += 1;
                if attempts > max_attempts {
                    return Err(e.context(format!(
                        "{} gave up after {} attempts",
                        settings.username, max_attempts
                    )));
                }
                warn!(
                    "{} session ended ({:#}); reconnecting in {:?} ({}/{})",
                    settings.username, e, reconnect_delay, attempts, max_attempts
                );
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}

/// Read operator commands from the local prompt and route them to the
/// named bot.
async fn command_loop(handles: HashMap<String, mpsc::UnboundedSender<ClientCommand>>) {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some(command) = commands::parse(trimmed) else {
            warn!("Unrecognized command: {}", trimmed);
            continue;
        };
        let (bot, client_command) = match command {
            commands::OperatorCommand::Come { bot, x, y, z } => {
                (bot, ClientCommand::Goto { x, y, z })
            }
            commands::OperatorCommand::Stop { bot } => (bot, ClientCommand::Stop),
            commands::OperatorCommand::Pos { bot } => (bot, ClientCommand::ReportPosition),
        };
        match handles.get(&bot) {
            Some(tx) => {
                let _ = tx.send(client_command);
            }
            None => warn!("No such bot: {}", bot),
        }
    }
}

async fn log_events(name: String, mut events: mpsc::UnboundedReceiver<ClientEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Login { username, uuid } => {
                info!("[{}] logged in as {} ({})", name, username, uuid);
            }
            ClientEvent::Spawn { entity_id } => {
                info!("[{}] spawned as entity {}", name, entity_id);
            }
            ClientEvent::Position { x, y, z } => {
                info!("[{}] at ({:.1}, {:.1}, {:.1})", name, x, y, z);
            }
            ClientEvent::Health { health, food } => {
                info!("[{}] health {:.1}, food {}", name, health, food);
            }
            ClientEvent::Chat { message } => {
                info!("[{}] chat: {}", name, message);
            }
            ClientEvent::Arrived { x, y, z } => {
                info!("[{}] arrived at ({:.1}, {:.1}, {:.1})", name, x, y, z);
            }
            ClientEvent::Error { message } => {
                warn!("[{}] error: {}", name, message);
            }
            ClientEvent::Disconnected { reason } => {
                warn!("[{}] disconnected: {}", name, reason);
            }
        }
    }
}
