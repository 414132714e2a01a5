//! Serve command implementation.
//!
//! Runs the ingestion server until Ctrl-C, then stops the sweeper and drains
//! the access log.

use std::sync::Arc;

use anyhow::{Context, Result};

use stitch_core::access_log::AccessLog;
use stitch_core::sink::FsSink;
use stitch_core::transfer::Collector;
use stitch_core::web::{AppState, WebServer};

use super::ServeArgs;

/// Run the serve command.
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = super::load_config(args.config.as_deref())?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.localhost_only {
        config.server.localhost_only = true;
    }
    if let Some(dir) = args.output_dir {
        config.storage.output_dir = dir;
    }
    if let Some(dir) = args.log_dir {
        config.access_log.dir = dir;
    }
    if args.no_access_log {
        config.access_log.enabled = false;
    }
    config.validate()?;

    tokio::fs::create_dir_all(&config.storage.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory {}",
                config.storage.output_dir.display()
            )
        })?;

    let sink = Arc::new(FsSink::new(&config.storage.output_dir));
    let collector = Arc::new(Collector::new(sink, config.transfer.clone()));
    let sweeper = collector.spawn_sweeper();

    let (access_log, log_task) = if config.access_log.enabled {
        let (log, task) = AccessLog::spawn(&config.access_log.dir, config.access_log.queue_capacity)
            .await
            .context("Failed to open access log")?;
        tracing::info!(path = %task.path().display(), "Access log enabled");
        (log, Some(task))
    } else {
        (AccessLog::disabled(), None)
    };

    let server = WebServer::new(
        config.server.clone(),
        AppState::new(Arc::clone(&collector), access_log),
    );
    let listener = server
        .bind()
        .await
        .with_context(|| format!("Failed to bind {}", server.bind_addr()))?;

    println!();
    println!("Stitch v{}", stitch_core::VERSION);
    println!("{}", "-".repeat(37));
    println!("  Listening:  http://{}", listener.local_addr()?);
    println!("  Output:     {}", config.storage.output_dir.display());
    println!();
    println!("Press Ctrl+C to stop");

    let result = server
        .serve(listener, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await;

    sweeper.stop().await;
    if let Some(task) = log_task {
        task.finish().await;
    }

    result.context("Web server failed")
}
