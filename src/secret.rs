use async_trait::async_trait;
use dashmap::DashMap;
use dotenvy::Error as DotenvError;
use rand::{RngCore, rng};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::{error, info};

/// Secrets are looked up by key and revealed through an opaque handle,
/// so callers only hold the plain value for as long as they need it.
#[async_trait]
pub trait SecretsManagerType: Send + Sync {
    async fn as_vec(&self) -> Vec<(String, String)> {
        let mut secrets = vec![];
        for key in self.keys() {
            if let Some(handle) = self.get(&key) {
                if let Ok(Some(secret)) = self.reveal(handle).await {
                    secrets.push((key, secret));
                }
            }
        }
        secrets
    }
    fn get(&self, key: &str) -> Option<u32>;
    fn keys(&self) -> Vec<String>;
    async fn add_secret(&self, key: &str, secret: &str) -> Result<(), SecretsError>;
    async fn update_secret(&self, key: &str, secret: &str) -> Result<(), SecretsError>;
    async fn delete_secret(&self, key: &str) -> Result<(), SecretsError>;
    async fn reveal(&self, handle: u32) -> Result<Option<String>, SecretsError>;
    fn name(&self) -> &'static str;
    fn clone_box(&self) -> Arc<dyn SecretsManagerType>;
    fn debug_box(&self) -> String;
}

pub struct SecretsManager(pub Arc<dyn SecretsManagerType + Send + Sync>);

impl SecretsManager {
    pub async fn add_secret(&self, key: &str, value: &str) -> Result<(), SecretsError> {
        self.0.add_secret(key, value).await
    }

    pub async fn update_secret(&self, key: &str, value: &str) -> Result<(), SecretsError> {
        self.0.update_secret(key, value).await
    }

    pub async fn delete_secret(&self, key: &str) -> Result<(), SecretsError> {
        self.0.delete_secret(key).await
    }

    pub async fn get_secret(&self, key: &str) -> Result<Option<String>, SecretsError> {
        match self.0.get(key) {
            Some(handle) => self.0.reveal(handle).await,
            None => Ok(None),
        }
    }
}

impl Clone for SecretsManager {
    fn clone(&self) -> Self {
        SecretsManager(self.0.clone_box())
    }
}

impl Debug for SecretsManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

impl Serialize for SecretsManager {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // never the values
        let mut state = serializer.serialize_struct("SecretsManager", 2)?;
        state.serialize_field("name", self.0.name())?;
        state.serialize_field("keys", &self.0.keys())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for SecretsManager {
    fn deserialize<D>(_deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Err(serde::de::Error::custom(
            "SecretsManager cannot be deserialized dynamically",
        ))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretsError {
    #[error("secrets file error: {0}")]
    Io(String),
    #[error("secret not found")]
    NotFound,
}

/// Secrets backed by a `.env` file, read once at start-up and rewritten on
/// every change made through the manager.
#[derive(Clone)]
pub struct EnvSecretsManager {
    keys: Arc<DashMap<String, u32>>,
    secrets: Arc<DashMap<u32, String>>,
    env_path: Option<PathBuf>,
}

impl EnvSecretsManager {
    /// `dir` is the directory holding the `.env` file. `None` keeps
    /// everything in memory.
    pub fn new(dir: Option<PathBuf>) -> Arc<Self> {
        let env_path = dir.map(|path| path.join(".env"));
        let mgr = Arc::new(Self {
            keys: Arc::new(DashMap::new()),
            secrets: Arc::new(DashMap::new()),
            env_path,
        });

        if let Some(envfile) = &mgr.env_path {
            if envfile.exists() {
                mgr.load_dotenv(envfile);
            } else {
                info!("no secrets file at {}, starting empty", envfile.display());
            }
        }

        mgr
    }

    fn insert(&self, key: &str, secret: &str) {
        let handle = match self.keys.get(key) {
            Some(handle) => *handle,
            None => {
                let id = rng().next_u32();
                self.keys.insert(key.to_string(), id);
                id
            }
        };
        self.secrets.insert(handle, secret.to_string());
    }

    fn load_dotenv(&self, path: &Path) {
        match dotenvy::from_path_iter(path) {
            Ok(iter) => {
                for item in iter {
                    match item {
                        Ok((k, v)) => self.insert(&k, &v),
                        Err(e) => error!("Malformed line in {}: {}", path.display(), e),
                    }
                }
                info!("secrets loaded from {}", path.display());
            }
            Err(DotenvError::Io(io)) if io.kind() == std::io::ErrorKind::NotFound => {
                info!("secrets file {} not found, skipping", path.display());
            }
            Err(e) => error!("Failed to read {}: {}", path.display(), e),
        }
    }

    fn write_dotenv(&self) -> Result<(), SecretsError> {
        let Some(path) = &self.env_path else {
            return Ok(());
        };

        let mut lines: Vec<String> = self
            .keys
            .iter()
            .filter_map(|entry| {
                self.secrets
                    .get(entry.value())
                    .map(|value| format!("{}={}", entry.key(), value.replace('\n', "\\n")))
            })
            .collect();
        lines.sort();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SecretsError::Io(e.to_string()))?;
        }
        let mut out = lines.join("\n");
        out.push('\n');
        std::fs::write(path, out).map_err(|e| {
            error!("Failed to write secrets file {}: {}", path.display(), e);
            SecretsError::Io(e.to_string())
        })
    }
}

impl Debug for EnvSecretsManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "EnvSecretsManager {{ keys: {:?} }}", self.keys())
    }
}

#[async_trait]
impl SecretsManagerType for EnvSecretsManager {
    fn get(&self, key: &str) -> Option<u32> {
        self.keys.get(key).map(|h| *h)
    }

    fn keys(&self) -> Vec<String> {
        self.keys.iter().map(|kv| kv.key().clone()).collect()
    }

    async fn add_secret(&self, key: &str, secret: &str) -> Result<(), SecretsError> {
        self.insert(key, secret);
        self.write_dotenv()
    }

    async fn update_secret(&self, key: &str, secret: &str) -> Result<(), SecretsError> {
        self.insert(key, secret);
        self.write_dotenv()
    }

    async fn delete_secret(&self, key: &str) -> Result<(), SecretsError> {
        let Some((_, handle)) = self.keys.remove(key) else {
            return Err(SecretsError::NotFound);
        };
        self.secrets.remove(&handle);
        self.write_dotenv()
    }

    async fn reveal(&self, handle: u32) -> Result<Option<String>, SecretsError> {
        Ok(self.secrets.get(&handle).map(|v| v.clone()))
    }

    fn name(&self) -> &'static str {
        "EnvSecrets"
    }

    fn clone_box(&self) -> Arc<dyn SecretsManagerType> {
        Arc::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!("EnvSecretsManager {{ keys: {:?} }}", self.keys())
    }
}

pub struct TestSecretsManager {
    handles: DashMap<String, u32>,
    secrets: DashMap<String, String>,
    next_handle: AtomicU32,
}

impl TestSecretsManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handles: DashMap::new(),
            secrets: DashMap::new(),
            next_handle: AtomicU32::new(1),
        })
    }

    /// Pre-populated manager, handy for wiring node contexts in tests.
    pub fn with_secrets<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Arc<Self> {
        let mgr = Self::new();
        for (key, value) in entries {
            let handle = mgr.next_handle.fetch_add(1, Ordering::Relaxed);
            mgr.handles.insert(key.to_string(), handle);
            mgr.secrets.insert(key.to_string(), value.to_string());
        }
        mgr
    }
}

impl Clone for TestSecretsManager {
    fn clone(&self) -> Self {
        let handles = DashMap::new();
        for kv in self.handles.iter() {
            handles.insert(kv.key().clone(), *kv.value());
        }

        let secrets = DashMap::new();
        for kv in self.secrets.iter() {
            secrets.insert(kv.key().clone(), kv.value().clone());
        }

        Self {
            handles,
            secrets,
            next_handle: AtomicU32::new(self.next_handle.load(Ordering::Relaxed)),
        }
    }
}

#[async_trait]
impl SecretsManagerType for TestSecretsManager {
    fn get(&self, key: &str) -> Option<u32> {
        self.handles.get(key).map(|v| *v)
    }

    fn keys(&self) -> Vec<String> {
        self.handles.iter().map(|kv| kv.key().clone()).collect()
    }

    async fn add_secret(&self, key: &str, secret: &str) -> Result<(), SecretsError> {
        self.handles
            .entry(key.to_string())
            .or_insert_with(|| self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.secrets.insert(key.to_string(), secret.to_string());
        Ok(())
    }

    async fn update_secret(&self, key: &str, secret: &str) -> Result<(), SecretsError> {
        if !self.handles.contains_key(key) {
            return Err(SecretsError::NotFound);
        }
        self.secrets.insert(key.to_string(), secret.to_string());
        Ok(())
    }

    async fn delete_secret(&self, key: &str) -> Result<(), SecretsError> {
        let existed_h = self.handles.remove(key).is_some();
        let existed_s = self.secrets.remove(key).is_some();
        if existed_h || existed_s {
            Ok(())
        } else {
            Err(SecretsError::NotFound)
        }
    }

    async fn reveal(&self, handle: u32) -> Result<Option<String>, SecretsError> {
        let key = self
            .handles
            .iter()
            .find(|kv| *kv.value() == handle)
            .map(|kv| kv.key().clone());

        Ok(key.and_then(|key| self.secrets.get(&key).map(|v| v.clone())))
    }

    fn name(&self) -> &'static str {
        "TestSecretsManager"
    }

    fn clone_box(&self) -> Arc<dyn SecretsManagerType> {
        Arc::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!(
            "TestSecretsManager {{ handles: {}, secrets: {} }}",
            self.handles.len(),
            self.secrets.len()
        )
    }
}
