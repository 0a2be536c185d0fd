//! Ingest command.

use std::path::Path;

use crate::ingest::{FilenameSource, IngestReceipt};

use super::{Session, print_json, report_tool_failure};

/// Fetch a URL into the library and queue a rescan
pub async fn cmd_ingest(
    session: &Session,
    url: &str,
    into: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    if !json {
        println!("Fetching {}...", url);
    }
    let receipt = session
        .facade
        .ingest(url, into, &session.cancel)
        .await
        .map_err(report_tool_failure)?;

    // On stderr so it shows up next to JSON output too.
    if let Some(warning) = rescan_warning(&receipt) {
        eprintln!("{}", warning);
    }
    if json {
        return print_json(&receipt);
    }
    match receipt.filename_source {
        FilenameSource::Reported => println!(
            "✓ Downloaded {} into {}",
            receipt.filename,
            receipt.directory.display()
        ),
        FilenameSource::Placeholder => println!(
            "✓ Download finished in {} (file name not reported, probably {})",
            receipt.directory.display(),
            receipt.filename
        ),
    }
    if receipt.rescan_scheduled {
        println!("  Library rescan queued");
    }
    Ok(())
}

/// Warning for a receipt whose follow-up rescan could not be queued.
fn rescan_warning(receipt: &IngestReceipt) -> Option<String> {
    (!receipt.rescan_scheduled).then(|| {
        format!(
            "⚠ Library rescan could not be queued; run `scan` to add {} to the catalog",
            receipt.filename
        )
    })
}
