use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FLAGS_FILE: &str = "local_flags.json";

/// Key the editor mirrors its dirty state under.
pub const ASSET_CHANGED_FLAG: &str = "isAssetChanged";

#[derive(Debug, Error)]
pub enum LocalFlagError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Small JSON map of named booleans persisted in the client's state
/// directory. Read on app exit to warn about unsaved edits; never consulted
/// for in-session decisions.
#[derive(Debug, Clone)]
pub struct LocalFlagStore {
    path: PathBuf,
}

impl LocalFlagStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(FLAGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Result<Option<bool>, LocalFlagError> {
        Ok(self.load()?.get(key).and_then(Value::as_bool))
    }

    pub fn set(&self, key: &str, value: bool) -> Result<(), LocalFlagError> {
        let mut flags = self.load()?;
        if flags.get(key).and_then(Value::as_bool) == Some(value) {
            return Ok(());
        }
        flags.insert(key.to_string(), Value::Bool(value));
        self.store(&flags)
    }

    fn load(&self) -> Result<Map<String, Value>, LocalFlagError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn store(&self, flags: &Map<String, Value>) -> Result<(), LocalFlagError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(flags)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
