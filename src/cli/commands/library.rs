//! Library scanning, listing and garbage collection commands.

use crate::catalog::Catalog;
use crate::db;
use crate::scanner::Scanner;

use super::{Session, print_json};

/// Reconcile the catalog with the library root
pub async fn cmd_scan(session: &Session, full: bool, json: bool) -> anyhow::Result<()> {
    if !json {
        println!("Scanning {}...", session.root.display());
    }
    let stats = session.scanner.scan_all(&session.cancel, full).await?;

    if json {
        return print_json(&stats);
    }
    println!(
        "Scan complete: {} updated, {} unchanged, {} missing, {} errors",
        stats.updated, stats.unchanged, stats.missing, stats.errors
    );
    Ok(())
}

/// List songs, optionally only those of one album
pub async fn cmd_list(session: &Session, album: Option<i64>, json: bool) -> anyhow::Result<()> {
    let files = match album {
        Some(id) => db::list_media_files_by_album(&session.pool, id).await?,
        None => db::list_media_files(&session.pool).await?,
    };

    if json {
        return print_json(&files);
    }
    for file in &files {
        let flag = if file.missing { " [missing]" } else { "" };
        println!(
            "{:>6}  {} - {} ({}){}  {}",
            file.id, file.artist, file.title, file.album, flag, file.path
        );
    }
    println!("{} songs", files.len());
    Ok(())
}

/// Purge orphaned albums and artists
pub async fn cmd_gc(session: &Session, json: bool) -> anyhow::Result<()> {
    let stats = session.catalog.run_garbage_collection().await?;

    if json {
        return print_json(&stats);
    }
    println!(
        "Removed {} albums and {} artists",
        stats.albums_removed, stats.artists_removed
    );
    Ok(())
}
