//! The validate command: static checks only, no network

use std::path::Path;

use colored::Colorize;

use arrsync_core::{Document, SyncEngine, SyncOptions};

use crate::error::Result;

/// Load the document and run every check that needs no service.
///
/// Returns the process exit code.
pub fn run_validate(path: &Path) -> Result<i32> {
    let document = Document::from_path(path)?;
    let desired = SyncEngine::new(SyncOptions::default()).prepare(&document)?;

    println!(
        "{} {} is valid: {} resource(s) across {} service(s)",
        "OK".green().bold(),
        path.display(),
        desired.graph.len(),
        desired.services.len()
    );
    for (name, profile) in &desired.services {
        let kinds: Vec<String> = desired
            .graph
            .kinds_for(name)
            .into_iter()
            .map(|kind| {
                let count = desired.graph.of_kind(name, kind).count();
                let pruned = if profile.prunes(kind) { ", pruned" } else { "" };
                format!("{kind} ({count}{pruned})")
            })
            .collect();
        println!(
            "   {} {} [{}] {}",
            "-".dimmed(),
            name.cyan(),
            profile.service_type,
            kinds.join(", ")
        );
    }
    Ok(0)
}
