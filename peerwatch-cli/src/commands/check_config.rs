//! Load, validate and describe a configuration file.

use anyhow::{Context, Result};
use peerwatch_core::{Config, FolderFactories};
use std::io::Write;
use std::path::Path;

/// Run the check-config command.
pub async fn run(path: &Path) -> Result<()> {
    let config = Config::from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let mut out = std::io::stdout();
    writeln!(out, "Config OK: {}", path.display())?;
    report(&config, &FolderFactories::default(), &mut out).await?;

    Ok(())
}

/// Describe `config`, starting each supported folder service once to
/// confirm it comes up.
pub async fn report<W: Write>(
    config: &Config,
    factories: &FolderFactories,
    out: &mut W,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "Devices:")?;
    writeln!(
        out,
        "  Idle timeout: {}s",
        config.devices.idle_timeout().as_secs()
    )?;

    writeln!(out)?;
    if config.folders.is_empty() {
        writeln!(out, "Folders: none configured")?;
        return Ok(());
    }

    writeln!(out, "Folders: {}", config.folders.len())?;
    for folder in &config.folders {
        let folder_type = folder.folder_type;
        if !factories.supports(folder_type) {
            writeln!(
                out,
                "  {} ({}) {}: no local service",
                folder.id,
                folder_type,
                folder.path.display()
            )?;
            continue;
        }

        let service = factories
            .create(folder.clone())
            .with_context(|| format!("Failed to create service for folder {}", folder.id))?;
        service.serve().await;
        writeln!(
            out,
            "  {} ({}) {}: {} [{}]",
            folder.id,
            folder_type,
            folder.path.display(),
            service,
            service.status().state
        )?;
    }

    Ok(())
}
