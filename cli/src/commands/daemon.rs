// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Long-running mode
//!
//! Keeps the job workers and the memory lifecycle scheduler alive until
//! Ctrl+C or SIGTERM, logging every domain event as it is published.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use tokio::signal;
use tracing::{debug, info, warn};

use lifeos_orchestrator_core::infrastructure::{DomainEvent, EventBusError, EventReceiver};

use crate::wiring::Services;

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Run workers and the lifecycle scheduler in the foreground
    Run,

    /// Run one lifecycle sweep over every user and exit
    Sweep,
}

pub async fn handle_command(command: DaemonCommand, services: &Services) -> Result<()> {
    match command {
        DaemonCommand::Run => run(services).await,
        DaemonCommand::Sweep => {
            let report = services.runtime.lifecycle_scheduler().sweep().await;
            println!(
                "{} decayed {}, pruned {}, promoted {}",
                "✓".green(),
                report.decayed,
                report.pruned,
                report.promoted
            );
            Ok(())
        }
    }
}

async fn run(services: &Services) -> Result<()> {
    let scheduler = services.runtime.lifecycle_scheduler();
    let scheduler_token = scheduler.shutdown_token();
    let scheduler_handle = scheduler.start();

    let tail_handle = tokio::spawn(tail_events(services.runtime.event_bus.subscribe()));

    info!("LifeOS daemon running. Press Ctrl+C to stop.");
    shutdown_signal().await;

    scheduler_token.cancel();
    if let Err(e) = scheduler_handle.await {
        warn!("Lifecycle scheduler stopped abnormally: {}", e);
    }
    tail_handle.abort();

    info!("LifeOS daemon stopped");
    Ok(())
}

async fn tail_events(mut receiver: EventReceiver) {
    loop {
        match receiver.recv().await {
            Ok(DomainEvent::Planning(event)) => debug!(?event, "planning event"),
            Ok(DomainEvent::Cortex(event)) => debug!(?event, "cortex event"),
            Err(EventBusError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
