use parking_lot::Mutex;
use std::{collections::{HashMap, HashSet}, fs, path::PathBuf, sync::Arc};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{error, info, warn};

use crate::error::PersistenceError;
use crate::models::Caption;

pub const STORAGE_KEY: &str = "ai-captions";

pub const LOAD_NOTICE: &str = "Could not load saved captions.";
pub const SAVE_NOTICE: &str = "Could not save captions. Changes may not survive a restart.";

/// Key-value string storage. Serialization stays with the store.
pub trait Persistence: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

impl<P: Persistence + ?Sized> Persistence for Arc<P> {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        (**self).write(key, value)
    }
}

/// One `<key>.json` file per key under a directory.
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Persistence for FilePersistence {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        run_blocking(|| {
            fs::create_dir_all(&self.dir)?;
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, value)?;
            fs::rename(&tmp, &path)?;
            Ok(())
        })
    }
}

/// Runs blocking file I/O so it does not stall other tasks on a worker
/// thread. `block_in_place` only exists on the multi-thread runtime; anywhere
/// else the closure runs inline.
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(f),
        _ => f(),
    }
}

/// In-process backend. `fail_writes` simulates a full or read-only medium.
#[derive(Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: Mutex<bool>,
}

impl MemoryPersistence {
    pub fn with_entry(key: &str, value: &str) -> Self {
        let p = Self::default();
        p.entries.lock().insert(key.to_string(), value.to_string());
        p
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl Persistence for MemoryPersistence {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.raw(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        if *self.fail_writes.lock() {
            return Err(PersistenceError::Unavailable("quota exceeded".into()));
        }
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Newest-first caption list mirrored to a persistence backend on every change.
/// The in-memory list is authoritative; failed saves never roll it back.
pub struct CaptionStore {
    captions: Vec<Caption>,
    persistence: Box<dyn Persistence>,
    notice: Option<String>,
}

impl CaptionStore {
    /// Absent data gives an empty store. Unreadable data gives an empty store
    /// plus the error, which is also kept as the store notice.
    pub fn load(persistence: Box<dyn Persistence>) -> (Self, Option<PersistenceError>) {
        let mut store = Self { captions: Vec::new(), persistence, notice: None };

        let loaded = store
            .persistence
            .read(STORAGE_KEY)
            .and_then(|raw| match raw {
                Some(raw) => Ok(serde_json::from_str::<Vec<Caption>>(&raw)?),
                None => Ok(Vec::new()),
            });

        match loaded {
            Ok(captions) => {
                let mut seen = HashSet::new();
                store.captions = captions.into_iter().filter(|c| seen.insert(c.id.clone())).collect();
                info!("📂 Loaded {} saved captions", store.captions.len());
                (store, None)
            }
            Err(e) => {
                warn!("Failed to load captions from storage: {}", e);
                store.notice = Some(LOAD_NOTICE.to_string());
                (store, Some(e))
            }
        }
    }

    pub fn captions(&self) -> &[Caption] {
        &self.captions
    }

    pub fn get(&self, id: &str) -> Option<&Caption> {
        self.captions.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.captions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captions.is_empty()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn insert_front(&mut self, caption: Caption) -> Result<(), PersistenceError> {
        self.captions.retain(|c| c.id != caption.id);
        self.captions.insert(0, caption);
        self.persist()
    }

    /// Returns whether anything was removed. An unknown id is not an error.
    pub fn remove(&mut self, id: &str) -> Result<bool, PersistenceError> {
        let before = self.captions.len();
        self.captions.retain(|c| c.id != id);
        let removed = self.captions.len() != before;
        self.persist()?;
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<(), PersistenceError> {
        self.captions.clear();
        self.persist()
    }

    fn persist(&mut self) -> Result<(), PersistenceError> {
        let result = serde_json::to_string(&self.captions)
            .map_err(PersistenceError::from)
            .and_then(|json| self.persistence.write(STORAGE_KEY, &json));

        match result {
            Ok(()) => {
                self.notice = None;
                Ok(())
            }
            Err(e) => {
                error!("Failed to save captions: {}", e);
                self.notice = Some(SAVE_NOTICE.to_string());
                Err(e)
            }
        }
    }
}
