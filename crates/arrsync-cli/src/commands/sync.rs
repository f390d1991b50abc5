//! The sync and plan commands

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use arrsync_client::{ArrAdapter, ServiceAdapter};
use arrsync_core::{ApplyPolicy, Document, SyncEngine, SyncOptions};

use crate::cli::RunArgs;
use crate::credentials::resolve_endpoints;
use crate::error::Result;
use crate::output::render_human;

/// Reconcile every service. Returns the process exit code.
pub async fn run_sync(args: &RunArgs, verbose: bool) -> Result<i32> {
    execute(args, false, verbose).await
}

/// Dry run: fetch and diff, change nothing. Returns the process exit code.
pub async fn run_plan(args: &RunArgs, verbose: bool) -> Result<i32> {
    execute(args, true, verbose).await
}

fn options(args: &RunArgs, dry_run: bool) -> SyncOptions {
    SyncOptions {
        prune: args.prune_override(),
        policy: ApplyPolicy {
            max_attempts: args.max_attempts.max(1),
            dry_run,
            ..ApplyPolicy::default()
        },
    }
}

/// Cancel `token` on Ctrl-C or once `timeout` elapses.
fn watch_for_cancellation(token: &CancellationToken, timeout: Option<Duration>) {
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; finishing in-flight calls");
            on_signal.cancel();
        }
    });

    if let Some(timeout) = timeout {
        let on_timeout = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = on_timeout.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    warn!(?timeout, "run timed out; finishing in-flight calls");
                    on_timeout.cancel();
                }
            }
        });
    }
}

async fn execute(args: &RunArgs, dry_run: bool, verbose: bool) -> Result<i32> {
    let document = Document::from_path(&args.document)?;
    let base_dir = args.document.parent().unwrap_or(Path::new("."));
    let endpoints = resolve_endpoints(
        &document,
        base_dir,
        Duration::from_secs(args.request_timeout),
        |var| std::env::var(var).ok(),
    )?;

    let mut adapters: BTreeMap<String, Arc<dyn ServiceAdapter>> = BTreeMap::new();
    for (name, endpoint) in endpoints {
        adapters.insert(name, Arc::new(ArrAdapter::new(endpoint)?));
    }

    let mut engine = SyncEngine::new(options(args, dry_run));
    for (name, adapter) in adapters {
        engine.register(name, adapter);
    }

    let cancel = CancellationToken::new();
    watch_for_cancellation(&cancel, args.timeout.map(Duration::from_secs));

    let report = engine.run(&document, cancel.clone()).await?;
    // Stop the timeout task
    cancel.cancel();
    info!(run_id = %report.run_id, exit_code = report.exit_code(), "run complete");

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", render_human(&report, verbose));
    }
    Ok(report.exit_code())
}
