//! External tool checks and config setup.

use std::path::Path;

use crate::config::{self, Config};
use crate::tools;

/// Check that the rewrite and fetch tools can be run
pub async fn cmd_check_tools(config: &Config) -> anyhow::Result<()> {
    println!("Checking external tools...\n");

    let checks = [
        ("ffmpeg", &config.tools.ffmpeg, "-version"),
        ("yt-dlp", &config.tools.fetcher, "--version"),
    ];
    let mut missing = 0;
    for (name, path, flag) in checks {
        let program = path.to_string_lossy();
        match tools::probe_version(&program, flag).await {
            Some(version) => println!("✓ {}: {}", name, version),
            None => {
                missing += 1;
                println!("✗ {}: NOT FOUND ({})", name, program);
            }
        }
    }

    if missing > 0 {
        println!();
        println!("Install the tools:");
        println!("  Windows: winget install Gyan.FFmpeg yt-dlp.yt-dlp");
        println!("  macOS:   brew install ffmpeg yt-dlp");
        println!("  Linux:   apt install ffmpeg yt-dlp (or your distro's equivalent)");
        println!("Or point [tools] in the config file at existing binaries.");
    }
    Ok(())
}

/// Write a default config file
pub fn cmd_init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let written = config::init(path, force)?;
    println!("Wrote default configuration to {}", written.display());
    Ok(())
}
