//! Session snapshot persistence using a JSON file
//!
//! Used by the CLI to keep local sessions between invocations. Reads take a
//! shared `fs2` lock and writes an exclusive one.

use crate::workflow::session::SessionSnapshot;
use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Root JSON document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionFile {
    pub sessions: Vec<SessionSnapshot>,
}

/// Snapshot store backed by one JSON file
pub struct SessionPersistence {
    store_path: PathBuf,
    store: Mutex<SessionFile>,
}

impl SessionPersistence {
    pub fn new<P: AsRef<Path>>(store_path: P) -> Result<Self> {
        let store_path = store_path.as_ref().to_path_buf();

        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session store directory")?;
        }

        let store = if store_path.exists() {
            Self::load_store(&store_path)?
        } else {
            SessionFile::default()
        };

        Ok(Self {
            store_path,
            store: Mutex::new(store),
        })
    }

    pub fn path(&self) -> &Path {
        &self.store_path
    }

    fn load_store(path: &Path) -> Result<SessionFile> {
        let file = File::open(path).context("Failed to open session store file")?;
        file.lock_shared()
            .context("Failed to acquire read lock on session store")?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(file);
        reader
            .read_to_string(&mut contents)
            .context("Failed to read session store")?;
        drop(reader);

        if contents.trim().is_empty() {
            return Ok(SessionFile::default());
        }
        serde_json::from_str(&contents).context("Failed to parse session store JSON")
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionFile>> {
        self.store
            .lock()
            .map_err(|_| anyhow!("Session store lock poisoned"))
    }

    fn save_store(&self, store: &SessionFile) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.store_path)
            .context("Failed to open session store file for writing")?;
        file.lock_exclusive()
            .context("Failed to acquire write lock on session store")?;

        let json =
            serde_json::to_string_pretty(store).context("Failed to serialize session store")?;
        let mut writer = std::io::BufWriter::new(file);
        writer
            .write_all(json.as_bytes())
            .context("Failed to write session store")?;
        writer
            .flush()
            .context("Failed to flush session store to disk")?;
        Ok(())
    }

    /// Insert or replace the snapshot with the same id
    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let mut store = self.lock()?;
        match store.sessions.iter_mut().find(|s| s.id == snapshot.id) {
            Some(existing) => *existing = snapshot.clone(),
            None => store.sessions.push(snapshot.clone()),
        }
        self.save_store(&store)
    }

    pub fn load(&self, id: Uuid) -> Result<Option<SessionSnapshot>> {
        let store = self.lock()?;
        Ok(store.sessions.iter().find(|s| s.id == id).cloned())
    }

    /// Most recently updated session
    pub fn latest(&self) -> Result<Option<SessionSnapshot>> {
        let store = self.lock()?;
        Ok(store.sessions.iter().max_by_key(|s| s.updated_at).cloned())
    }

    pub fn remove(&self, id: Uuid) -> Result<bool> {
        let mut store = self.lock()?;
        let before = store.sessions.len();
        store.sessions.retain(|s| s.id != id);
        if store.sessions.len() == before {
            return Ok(false);
        }
        self.save_store(&store)?;
        Ok(true)
    }

    pub fn list(&self) -> Result<Vec<SessionSnapshot>> {
        Ok(self.lock()?.sessions.clone())
    }
}
