//! Deletion commands.

use crate::deletion::FileRemoval;
use crate::outcome::MutationOutcome;

use super::{Session, print_json};

/// Delete a song
pub async fn cmd_delete_song(session: &Session, id: i64, json: bool) -> anyhow::Result<()> {
    let result = session.facade.delete_song(id).await?;

    if json {
        return print_json(&result);
    }
    match result.file {
        FileRemoval::Removed => println!("✓ Deleted {}", result.path.display()),
        FileRemoval::AlreadyAbsent => println!(
            "✓ Removed song {} (file was already gone: {})",
            id,
            result.path.display()
        ),
    }
    if result.album_orphaned {
        if result.gc_scheduled {
            println!("  Album is now empty; garbage collection queued");
        } else {
            println!("  Album is now empty; the next `gc` will remove it");
        }
    }
    Ok(())
}

/// Delete an album with its songs and folders
pub async fn cmd_delete_album(session: &Session, id: i64, json: bool) -> anyhow::Result<()> {
    let result = session.facade.delete_album(id).await?;

    if json {
        return print_json(&result);
    }
    for target in &result.songs.outcomes {
        if let MutationOutcome::Failed { message, .. } = &target.outcome {
            println!("✗ {}: {}", target.path.display(), message);
        }
    }
    println!(
        "✓ Album {}: {} files deleted, {} already missing, {} failed",
        id, result.songs.succeeded, result.songs.skipped, result.songs.failed
    );
    for folder in &result.folders_removed {
        println!("  Removed folder {}", folder.display());
    }
    if let Some(gc) = result.gc {
        println!(
            "  Garbage collection removed {} albums and {} artists",
            gc.albums_removed, gc.artists_removed
        );
    }
    Ok(())
}
