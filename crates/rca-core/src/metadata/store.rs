//! Locked read-modify-write access to a snapshot's `metadata.json`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::RcaResult;
use crate::metadata::document::{MetadataDocument, METADATA_FILENAME};

/// One lock per snapshot directory, shared by every store opened on it.
static DIR_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn dir_lock(dir: &Path) -> Arc<Mutex<()>> {
    let key = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    Arc::clone(DIR_LOCKS.lock().entry(key).or_default())
}

/// Serializes every load/update/save of one metadata document.
///
/// Stores opened on the same directory in this process share a lock; each
/// `update` holds it for the whole load -> mutate -> save transaction and
/// replaces the file atomically.
pub struct MetadataStore {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl MetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let lock = dir_lock(&dir);
        Self { dir, lock }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(METADATA_FILENAME)
    }

    pub fn load(&self) -> RcaResult<MetadataDocument> {
        let _guard = self.lock.lock();
        MetadataDocument::load(&self.dir)
    }

    pub fn save(&self, document: &MetadataDocument) -> RcaResult<()> {
        let _guard = self.lock.lock();
        document.validate()?;
        self.write_document(document)
    }

    /// Run `mutate` against the current document and persist the result.
    ///
    /// Nothing is written if the mutated document fails validation.
    pub fn update<T, F>(&self, mutate: F) -> RcaResult<T>
    where
        F: FnOnce(&mut MetadataDocument) -> T,
    {
        let _guard = self.lock.lock();
        let mut document = MetadataDocument::load(&self.dir)?;
        let result = mutate(&mut document);
        document.validate()?;
        self.write_document(&document)?;
        Ok(result)
    }

    fn write_document(&self, document: &MetadataDocument) -> RcaResult<()> {
        let target = self.path();
        let staging = self.dir.join(format!(".{METADATA_FILENAME}.tmp"));
        {
            let file = File::create(&staging)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, document)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&staging, &target)?;
        debug!(path = %target.display(), services = document.services.len(), "metadata saved");
        Ok(())
    }
}
