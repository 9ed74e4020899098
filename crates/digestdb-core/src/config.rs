//! Construction-time settings for a [`DigestDb`](crate::DigestDb).

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use dirs_next::home_dir;

use crate::store::{HashAlgorithm, StoreError, DEFAULT_DIR_DEPTH, LOCK_FILENAME};

const ROOT_ENV: &str = "DIGESTDB_ROOT";
const DEPTH_ENV: &str = "DIGESTDB_DIR_DEPTH";
const HASH_ENV: &str = "DIGESTDB_HASH";
const DEFAULT_STORE_NAME: &str = "digestdb";
const DEFAULT_ROOT_DIRNAME: &str = ".digestdb";

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    root: PathBuf,
    index_filename: Option<String>,
    data_dirname: Option<String>,
    hash: HashAlgorithm,
    dir_depth: usize,
}

impl StoreConfig {
    /// Settings for the store rooted at `root`, with every other option at
    /// its default.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_filename: None,
            data_dirname: None,
            hash: HashAlgorithm::default(),
            dir_depth: DEFAULT_DIR_DEPTH,
        }
    }

    /// Builds a configuration from `DIGESTDB_ROOT`, `DIGESTDB_DIR_DEPTH` and
    /// `DIGESTDB_HASH`.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or no home directory
    /// is available for the default root.
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture(), None)
    }

    /// Like [`StoreConfig::from_env`], with `root` taking precedence over
    /// `DIGESTDB_ROOT`.
    pub fn from_env_with_root(root: impl Into<PathBuf>) -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture(), Some(root.into()))
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot, root: Option<PathBuf>) -> Result<Self> {
        let root = match (root, snapshot.var(ROOT_ENV)) {
            (Some(root), _) => root,
            (None, Some(value)) => expand_home(value)?,
            (None, None) => home_dir()
                .ok_or_else(|| anyhow!("home directory not found; set {ROOT_ENV}"))?
                .join(DEFAULT_ROOT_DIRNAME),
        };
        let mut config = Self::new(root);
        if let Some(value) = snapshot.var(DEPTH_ENV) {
            let depth = value
                .trim()
                .parse::<usize>()
                .with_context(|| {
                    format!("{DEPTH_ENV} must be a non-negative integer, got '{value}'")
                })?;
            config = config.with_dir_depth(depth);
        }
        if let Some(value) = snapshot.var(HASH_ENV) {
            let hash = value
                .parse::<HashAlgorithm>()
                .with_context(|| format!("invalid {HASH_ENV}"))?;
            config = config.with_hash(hash);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_index_filename(mut self, name: impl Into<String>) -> Self {
        self.index_filename = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_data_dirname(mut self, name: impl Into<String>) -> Self {
        self.data_dirname = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_hash(mut self, hash: HashAlgorithm) -> Self {
        self.hash = hash;
        self
    }

    #[must_use]
    pub fn with_dir_depth(mut self, depth: usize) -> Self {
        self.dir_depth = depth;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        match &self.index_filename {
            Some(name) => self.root.join(name),
            None => self.root.join(format!("{}.db", self.store_name())),
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dirname {
            Some(name) => self.root.join(name),
            None => self.root.join(format!("{}.data", self.store_name())),
        }
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILENAME)
    }

    #[must_use]
    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    #[must_use]
    pub fn dir_depth(&self) -> usize {
        self.dir_depth
    }

    /// Reject settings that could never produce a usable store.
    ///
    /// # Errors
    /// `InvalidDepth` when the depth exceeds the digest length in bytes.
    pub fn validate(&self) -> Result<()> {
        let max = self.hash.digest_len();
        if self.dir_depth > max {
            return Err(StoreError::InvalidDepth {
                depth: self.dir_depth,
                max,
            }
            .into());
        }
        Ok(())
    }

    fn store_name(&self) -> &str {
        self.root
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.starts_with('.') && !name.is_empty())
            .unwrap_or(DEFAULT_STORE_NAME)
    }
}

fn expand_home(value: &str) -> Result<PathBuf> {
    let value = value.trim();
    let Some(rest) = value.strip_prefix('~') else {
        return Ok(PathBuf::from(value));
    };
    if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\')) {
        return Ok(PathBuf::from(value));
    }
    let home = home_dir().ok_or_else(|| anyhow!("home directory not found for '{value}'"))?;
    let rest = rest.trim_start_matches(['/', '\\']);
    Ok(if rest.is_empty() {
        home
    } else {
        home.join(rest)
    })
}
