use crate::model::SaveRecord;
use std::{
    cell::RefCell,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("save file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("save file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Load/save of the single flat pet record.
pub(crate) trait PetStore: Send + Sync + 'static {
    fn load(&self) -> Result<Option<SaveRecord>, StoreError>;
    fn save(&self, record: &SaveRecord) -> Result<(), StoreError>;
}

pub(crate) struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl PetStore for JsonFileStore {
    fn load(&self) -> Result<Option<SaveRecord>, StoreError> {
        let s = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_str(&s)
            .map(Some)
            .map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })
    }

    /// Each save writes its own temp file next to the target and renames it
    /// into place, so concurrent saves never share a partial file.
    fn save(&self, record: &SaveRecord) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        let data = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_err(e))?;
        tmp.write_all(&data).map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        Ok(())
    }
}

/// Never-fatal front of a [`PetStore`]: loads fall back to `None`, saves
/// report a bool and log the reason.
pub(crate) struct Persister {
    store: Arc<dyn PetStore>,
    in_flight: RefCell<Vec<JoinHandle<bool>>>,
}

impl Persister {
    pub(crate) fn new(store: Arc<dyn PetStore>) -> Self {
        Self {
            store,
            in_flight: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn load(&self) -> Option<SaveRecord> {
        match self.store.load() {
            Ok(Some(rec)) => {
                info!("pet state loaded");
                Some(rec)
            }
            Ok(None) => {
                info!("no saved pet state, starting fresh");
                None
            }
            Err(e) => {
                warn!(error = %e, "could not load pet state, using defaults");
                None
            }
        }
    }

    pub(crate) fn save(&self, record: &SaveRecord) -> bool {
        save_logged(self.store.as_ref(), record)
    }

    /// Fire-and-forget save on the blocking pool. A newer save does not wait
    /// for an older one; whichever finishes last wins.
    pub(crate) fn save_detached(&self, record: SaveRecord) {
        let store = Arc::clone(&self.store);
        let handle = tokio::task::spawn_blocking(move || save_logged(store.as_ref(), &record));
        let mut in_flight = self.in_flight.borrow_mut();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }

    /// Waits for every outstanding detached save. `None` if there were none,
    /// otherwise whether all of them succeeded.
    pub(crate) async fn settle(&self) -> Option<bool> {
        let handles = std::mem::take(&mut *self.in_flight.borrow_mut());
        if handles.is_empty() {
            return None;
        }
        let mut all_ok = true;
        for handle in handles {
            match handle.await {
                Ok(ok) => all_ok &= ok,
                Err(e) => {
                    warn!(error = %e, "save task did not finish");
                    all_ok = false;
                }
            }
        }
        Some(all_ok)
    }
}

fn save_logged(store: &dyn PetStore, record: &SaveRecord) -> bool {
    match store.save(record) {
        Ok(()) => {
            debug!("pet state saved");
            true
        }
        Err(e) => {
            warn!(error = %e, "could not save pet state");
            false
        }
    }
}

#[cfg(test)]
pub(crate) use memory::MemoryStore;

#[cfg(test)]
mod memory {
    use super::{PetStore, StoreError};
    use crate::model::SaveRecord;
    use std::{io, path::PathBuf, sync::Mutex};

    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub(crate) record: Mutex<Option<SaveRecord>>,
        pub(crate) saves: Mutex<u32>,
        pub(crate) fail: bool,
    }

    impl MemoryStore {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn saved(&self) -> Option<SaveRecord> {
            self.record.lock().unwrap().clone()
        }
    }

    impl PetStore for MemoryStore {
        fn load(&self) -> Result<Option<SaveRecord>, StoreError> {
            Ok(self.saved())
        }

        fn save(&self, record: &SaveRecord) -> Result<(), StoreError> {
            *self.saves.lock().unwrap() += 1;
            if self.fail {
                return Err(StoreError::Io {
                    path: PathBuf::from("memory"),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            *self.record.lock().unwrap() = Some(record.clone());
            Ok(())
        }
    }
}
