//! Cache artifact assembly
//!
//! Annotated JPEGs of one study are packed into a single deflated zip named
//! `<study_date>_<study_uid>.zip` in the flat cache directory. Each writer
//! fills its own hidden `.partial` temp file next to the target and moves it
//! into place without overwriting, so a file at the final path is always
//! complete.

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::types::{FetchedImage, StudyMetadata, StudyUid};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::CompressionMethod;
use zip::write::FileOptions;

/// File name of a study's archive, without directory
pub fn cache_key(study_date: &str, study_uid: &StudyUid) -> String {
    format!("{study_date}_{study_uid}.zip")
}

/// Packs fetched images into the durable per-study archive
#[derive(Clone, Debug)]
pub struct ArchiveAssembler {
    cache_dir: PathBuf,
    temp_dir: PathBuf,
    delete_temp_files: bool,
}

impl ArchiveAssembler {
    /// Create an assembler for the configured cache layout
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            temp_dir: config.temp_dir.clone(),
            delete_temp_files: config.delete_temp_files,
        }
    }

    /// Final location of a study's archive
    pub fn archive_path(&self, study_date: &str, study_uid: &StudyUid) -> PathBuf {
        self.cache_dir.join(cache_key(study_date, study_uid))
    }

    /// Location of the study's archive if it has been written
    pub async fn existing(&self, study: &StudyMetadata) -> Option<PathBuf> {
        let path = self.archive_path(&study.study_date, &study.study_uid);
        tokio::fs::try_exists(&path)
            .await
            .unwrap_or(false)
            .then_some(path)
    }

    /// Write the archive for `study` from the given images
    ///
    /// An existing archive is returned untouched, and so is one another
    /// writer moved into place while this one was zipping. On a write failure
    /// the partial file is removed and the working directory is kept for
    /// inspection.
    pub async fn assemble(&self, study: &StudyMetadata, images: &[FetchedImage]) -> Result<PathBuf> {
        if let Some(target) = self.existing(study).await {
            debug!(path = ?target, "archive already exists");
            return Ok(target);
        }
        let target = self.archive_path(&study.study_date, &study.study_uid);
        if images.is_empty() {
            return Err(Error::EmptyResult {
                study_uid: study.study_uid.to_string(),
            });
        }

        let persistence = |reason: String| Error::Persistence {
            path: target.clone(),
            reason,
        };

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| persistence(format!("cannot create cache directory: {e}")))?;

        let partial = tempfile::Builder::new()
            .prefix(&format!(".{}.", cache_key(&study.study_date, &study.study_uid)))
            .suffix(".partial")
            .tempfile_in(&self.cache_dir)
            .map_err(|e| persistence(format!("cannot create partial archive: {e}")))?;
        let entries: Vec<(String, PathBuf)> = images
            .iter()
            .map(|image| (format!("{}.jpeg", image.instance.sop_uid), image.path.clone()))
            .collect();

        let destination = target.clone();
        // Dropping `partial` on any error path deletes it
        tokio::task::spawn_blocking(move || -> std::result::Result<(), String> {
            write_zip(partial.as_file(), &entries).map_err(|e| e.to_string())?;
            match partial.persist_noclobber(&destination) {
                Ok(_) => Ok(()),
                Err(_) if destination.exists() => {
                    debug!(path = ?destination, "archive was written concurrently, keeping it");
                    Ok(())
                }
                Err(e) => Err(format!("cannot move archive into place: {}", e.error)),
            }
        })
        .await
        .map_err(|e| persistence(format!("zip writer task failed: {e}")))?
        .map_err(persistence)?;

        info!(
            study_uid = %study.study_uid,
            path = ?target,
            images = images.len(),
            "archive written"
        );

        if self.delete_temp_files {
            let work_dir = self.temp_dir.join(study.study_uid.as_str());
            match tokio::fs::remove_dir_all(&work_dir).await {
                Ok(()) => debug!(path = ?work_dir, "removed working directory"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = ?work_dir, error = %e, "could not remove working directory"),
            }
        }

        Ok(target)
    }
}

/// Number of entries in a written archive
pub async fn entry_count(path: &Path) -> Result<usize> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<usize> {
        let archive = zip::ZipArchive::new(File::open(&path)?).map_err(|e| Error::Persistence {
            path: path.clone(),
            reason: format!("unreadable archive: {e}"),
        })?;
        Ok(archive.len())
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(format!("archive reader task failed: {e}"))))?
}

fn write_zip(file: &File, entries: &[(String, PathBuf)]) -> zip::result::ZipResult<()> {
    let mut writer = zip::ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, source) in entries {
        let mut input = File::open(source)?;
        writer.start_file(name.as_str(), options)?;
        std::io::copy(&mut input, &mut writer)?;
    }

    let mut inner = writer.finish()?;
    inner.flush()?;
    Ok(())
}
