//! Tag edit commands.

use crate::outcome::{BulkStatus, MutationOutcome};
use crate::tags::{TagDiff, TagScope};

use super::{Session, print_json, report_tool_failure};

/// Rewrite tags of one song
pub async fn cmd_edit_song(
    session: &Session,
    id: i64,
    assignments: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let diff = TagDiff::parse_assignments(TagScope::Song, assignments)?;
    session
        .facade
        .edit_song(id, &diff, &session.cancel)
        .await
        .map_err(report_tool_failure)?;

    if json {
        return print_json(&serde_json::json!({ "id": id, "updated": diff }));
    }
    println!("✓ Updated {} field(s) of song {}", diff.len(), id);
    Ok(())
}

/// Rewrite tags of every song on an album
pub async fn cmd_edit_album(
    session: &Session,
    id: i64,
    assignments: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let diff = TagDiff::parse_assignments(TagScope::Album, assignments)?;
    let summary = session.facade.edit_album(id, &diff, &session.cancel).await?;

    if json {
        print_json(&summary)?;
    } else {
        for target in &summary.outcomes {
            match &target.outcome {
                MutationOutcome::Succeeded => println!("✓ {}", target.path.display()),
                MutationOutcome::Skipped { reason } => {
                    println!("- {} (skipped: {})", target.path.display(), reason)
                }
                MutationOutcome::Failed { message, .. } => {
                    println!("✗ {}: {}", target.path.display(), message)
                }
            }
        }
        println!(
            "\n{} updated, {} skipped, {} failed",
            summary.succeeded, summary.skipped, summary.failed
        );
    }

    if summary.status == BulkStatus::Failed {
        anyhow::bail!("no song of album {} could be updated", id);
    }
    Ok(())
}
