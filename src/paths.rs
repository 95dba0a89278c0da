use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::settings::{APP_NAME, Settings};

/// Environment variable that overrides the storage directory.
pub const STORAGE_DIR_ENV: &str = "MARGINALIA_STORAGE_DIR";

/// Compute a file-name-safe slug that uniquely identifies a page origin.
/// Format: `<md5_first_12>_<slugified_origin>`
pub fn origin_slug(origin: &str) -> String {
    let digest = md5::compute(origin.as_bytes());
    let hash_prefix = &format!("{digest:x}")[..12];

    let readable = origin
        .split_once("://")
        .map_or(origin, |(_, rest)| rest)
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .to_lowercase();

    if readable.is_empty() {
        format!("{hash_prefix}_opaque")
    } else {
        format!("{hash_prefix}_{readable}")
    }
}

/// Pick the directory holding per-origin comment files.
///
/// Precedence: command line, then environment, then settings, then the XDG
/// data directory. The directory is created if it does not exist.
pub fn resolve_storage_dir(
    cli_dir: Option<&Path>,
    env_dir: Option<OsString>,
    settings: &Settings,
) -> Result<PathBuf> {
    let dir = match (cli_dir, env_dir.filter(|v| !v.is_empty())) {
        (Some(dir), _) => dir.to_path_buf(),
        (None, Some(dir)) => PathBuf::from(dir),
        (None, None) => match &settings.storage_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .context("Could not determine data directory")?
                .join(APP_NAME)
                .join("storage"),
        },
    };

    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create storage directory: {dir:?}"))?;
    Ok(dir)
}

/// Path of `marginalia.log`, which the CLI appends to on every run: the
/// command, wrap strategy fallbacks and storage errors.
///
/// Lives under `state_dir` where the platform has one, else `cache_dir`.
pub fn resolve_log_path() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(dirs::cache_dir)
        .context("Could not determine state or cache directory")?;

    let log_dir = base.join(APP_NAME);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {log_dir:?}"))?;

    Ok(log_dir.join(format!("{APP_NAME}.log")))
}
