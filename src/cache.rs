//! Content-addressed OCR cache.
//!
//! One JSON file per document, named by the SHA-256 of the file bytes. A
//! missing or unreadable entry is a cache miss; write failures are logged
//! and ignored, so the cache can never fail a run.

use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::models::OcrDocument;

/// Hex-encoded SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub struct OcrCache {
    dir: PathBuf,
}

impl OcrCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hash))
    }

    pub fn load(&self, hash: &str) -> Option<OcrDocument> {
        let path = self.entry_path(hash);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<OcrDocument>(&content) {
            Ok(doc) => {
                debug!(hash = %hash, "OCR cache hit");
                Some(doc)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt OCR cache entry, recomputing");
                None
            }
        }
    }

    pub fn store(&self, doc: &OcrDocument) {
        if let Err(e) = self.try_store(doc) {
            warn!(hash = %doc.sha256, error = %e, "failed to write OCR cache entry");
        }
    }

    fn try_store(&self, doc: &OcrDocument) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string(doc)?;
        std::fs::write(self.entry_path(&doc.sha256), json)?;
        Ok(())
    }
}
