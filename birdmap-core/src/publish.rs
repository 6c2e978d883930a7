use chrono::{DateTime, Utc};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

use crate::{config::PublishConfig, error::PublishError};

pub const LATEST_FILE: &str = "latest.html";
pub const ARCHIVE_PREFIX: &str = "ebird_radius_map_";
const ARCHIVE_SUFFIX: &str = ".html";

/// Paths touched by one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub latest: PathBuf,
    pub archive: Option<PathBuf>,
    pub pruned: usize,
}

/// Writes rendered maps into the output directory served by the static host.
#[derive(Debug, Clone)]
pub struct Publisher {
    output_dir: PathBuf,
    archive: bool,
    keep_count: usize,
}

impl Publisher {
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            archive: config.archive,
            keep_count: config.keep_count,
        }
    }

    /// Replace `latest.html`, then write and prune the timestamped archive.
    pub fn publish(
        &self,
        html: &str,
        generated_at: DateTime<Utc>,
        radius_km: u32,
    ) -> Result<Published, PublishError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| PublishError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })?;

        let latest = self.output_dir.join(LATEST_FILE);
        write_atomic(&latest, html)?;
        log::info!("Updated '{}'", latest.display());

        if !self.archive {
            return Ok(Published { latest, archive: None, pruned: 0 });
        }

        let archive = self.output_dir.join(archive_file_name(generated_at, radius_km));
        write_atomic(&archive, html)?;
        log::info!("Map saved as '{}'", archive.display());

        let pruned = self.prune_archive()?;
        log::info!("Archive pruning - kept {}, removed {pruned}", self.keep_count);

        Ok(Published { latest, archive: Some(archive), pruned })
    }

    /// Delete all but the newest `keep_count` archive files. Never touches
    /// `latest.html` or unrelated files. Returns the number removed.
    pub fn prune_archive(&self) -> Result<usize, PublishError> {
        let entries = fs::read_dir(&self.output_dir).map_err(|source| {
            PublishError::ListArchive { path: self.output_dir.clone(), source }
        })?;

        let mut archived: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_archive_file(name))
            .collect();

        // Timestamped names sort chronologically; newest first.
        archived.sort_unstable_by(|a, b| b.cmp(a));

        let mut removed = 0;
        for name in archived.iter().skip(self.keep_count) {
            let path = self.output_dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => log::warn!("Could not remove old map '{}': {err}", path.display()),
            }
        }

        Ok(removed)
    }
}

/// `ebird_radius_map_2024-01-05_14-30-00_10km.html`
pub fn archive_file_name(generated_at: DateTime<Utc>, radius_km: u32) -> String {
    format!(
        "{ARCHIVE_PREFIX}{}_{radius_km}km{ARCHIVE_SUFFIX}",
        generated_at.format("%Y-%m-%d_%H-%M-%S")
    )
}

fn is_archive_file(name: &str) -> bool {
    name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX)
}

/// Write via a temp file in the same directory and rename over `path`, so
/// readers only ever see the old or the new document.
fn write_atomic(path: &Path, contents: &str) -> Result<(), PublishError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let write_err = |source: std::io::Error| PublishError::Write { path: path.to_path_buf(), source };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    // Temp files are created 0600; the static host needs to read them.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644)).map_err(write_err)?;
    }

    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
