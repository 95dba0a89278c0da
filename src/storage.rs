//! String key-value persistence, partitioned by page origin.

use anyhow::{Context, Result};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::paths::origin_slug;

/// Synchronous string storage, one instance per page origin.
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&mut self, key: &str) -> Result<()>;
}

/// In-memory store, mostly useful for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    items: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, key: &str, value: &str) -> Self {
        self.items.insert(key.to_string(), value.to_string());
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        self.items.remove(key);
        Ok(())
    }
}

/// Store backed by one JSON object file per origin.
///
/// Every write rewrites the whole file.
#[derive(Debug)]
pub struct FileStore {
    file_path: PathBuf,
    items: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(file_path: PathBuf) -> Result<Self> {
        let items = if file_path.exists() {
            Self::load_from_file(&file_path)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { file_path, items })
    }

    /// Opens the file for the origin of `page_url` inside `dir`.
    pub fn for_origin(dir: &Path, page_url: &str) -> Result<Self> {
        let origin = origin_of(page_url)?;
        let file_path = dir.join(format!("origin_{}.json", origin_slug(&origin)));
        debug!("Using storage file {file_path:?} for origin {origin}");
        Self::open(file_path)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn load_from_file(file_path: &Path) -> Result<BTreeMap<String, String>> {
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read storage file {file_path:?}"))?;

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse storage file {file_path:?}"))
    }

    fn save_to_disk(&self) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create storage directory {parent:?}"))?;
        }
        let json =
            serde_json::to_string_pretty(&self.items).context("Failed to serialize storage")?;
        fs::write(&self.file_path, json).context("Failed to write storage file")?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        self.save_to_disk()
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        if self.items.remove(key).is_some() {
            self.save_to_disk()?;
        }
        Ok(())
    }
}

/// Serialized origin (`scheme://host[:port]`) of a page URL.
pub fn origin_of(page_url: &str) -> Result<String> {
    let url = Url::parse(page_url).with_context(|| format!("Invalid page URL: {page_url}"))?;
    Ok(url.origin().ascii_serialization())
}
