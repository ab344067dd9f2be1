//! # gattlink — interactive GATT client
//!
//! Composition root that starts the interpreter process and exposes the
//! session on an interactive console.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Install the `tracing` subscriber (stderr, so stdout stays clean)
//! - Spawn `gatttool` through the process adapter
//! - Broadcast session events and print them as JSON lines
//! - Read console commands from stdin until `quit`, Ctrl-C or process exit
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no protocol logic belongs here.

mod config;
mod console;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc};

use gattlink_app::event_broadcaster::EventBroadcaster;
use gattlink_app::ports::GattListener;
use gattlink_domain::event::GattEvent;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.logging.filter);

    // Events
    let broadcaster = Arc::new(EventBroadcaster::new(256));
    let printer = config
        .console
        .echo_events
        .then(|| tokio::spawn(print_events(broadcaster.subscribe())));
    let listener: Arc<dyn GattListener> = broadcaster;

    // Interpreter
    let session = gattlink_adapter_gatttool::spawn(&config.gatttool, Some(listener))
        .await
        .with_context(|| format!("failed to start {}", config.gatttool.program))?;

    tokio::select! {
        () = console::run(&session, stdin_lines()) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    // release drops the listener, the last owner of the broadcaster, so the
    // printer drains what is queued and stops
    session.release().await;
    if let Some(printer) = printer {
        if let Err(err) = printer.await {
            tracing::warn!(%err, "event printer failed");
        }
    }
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Read stdin on a plain thread so a pending read never holds up shutdown.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn print_events(mut events: broadcast::Receiver<GattEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => println!("{json}"),
                Err(err) => tracing::warn!(%err, "failed to serialize event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
