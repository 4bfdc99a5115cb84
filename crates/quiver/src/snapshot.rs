//! JSON snapshot persistence.
//!
//! A snapshot stores libraries, documents, and chunks, never index
//! internals. On load the database seeds its id generator past the highest
//! persisted id and rebuilds every library's index from its chunks.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use quiver_core::{Chunk, Document, Library};

use crate::error::{Error, Result};
use crate::service::Shared;

/// The persisted form of the entity stores.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub(crate) libraries: Vec<Library>,
    pub(crate) documents: Vec<Document>,
    pub(crate) chunks: Vec<Chunk>,
}

impl Snapshot {
    /// Capture the current entity stores.
    pub(crate) fn capture(state: &Shared) -> Result<Self> {
        Ok(Self {
            libraries: state.libraries.list()?,
            documents: state.documents.all()?,
            chunks: state.chunks.all()?,
        })
    }

    /// The highest entity id in the snapshot, for id generator resume.
    pub(crate) fn max_id(&self) -> u64 {
        let libraries = self.libraries.iter().map(|l| l.id.as_u64()).max().unwrap_or(0);
        let documents = self.documents.iter().map(|d| d.id.as_u64()).max().unwrap_or(0);
        let chunks = self.chunks.iter().map(|c| c.id.as_u64()).max().unwrap_or(0);
        libraries.max(documents).max(chunks)
    }

    /// Load a snapshot from `path`. A missing file is not an error.
    pub(crate) fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(Error::internal(format!(
                    "failed to read snapshot {}: {err}",
                    path.display()
                )))
            }
        };
        let snapshot: Self = serde_json::from_slice(&bytes).map_err(|err| {
            Error::internal(format!("corrupt snapshot {}: {err}", path.display()))
        })?;
        info!(
            path = %path.display(),
            libraries = snapshot.libraries.len(),
            documents = snapshot.documents.len(),
            chunks = snapshot.chunks.len(),
            "loaded snapshot"
        );
        Ok(Some(snapshot))
    }

    /// Write the snapshot atomically: a temp file in the same directory is
    /// renamed over the target, so readers never see a torn file.
    pub(crate) fn write(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|err| Error::internal(format!("failed to encode snapshot: {err}")))?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|err| {
            Error::internal(format!("failed to write snapshot {}: {err}", tmp.display()))
        })?;
        if let Err(err) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            warn!(path = %path.display(), "snapshot rename failed");
            return Err(Error::internal(format!(
                "failed to move snapshot into place at {}: {err}",
                path.display()
            )));
        }

        info!(path = %path.display(), chunks = self.chunks.len(), "saved snapshot");
        Ok(())
    }
}
