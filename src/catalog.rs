use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{error, info};

static EMBEDDED_CATALOG: &str = include_str!("../data/theorems.json");

/// One theorem card: title, prose description (may embed math notation),
/// tag list, and the proof page it links out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub link: String,
}

impl Entry {
    /// Tags flattened into a single scoreable field.
    pub fn joined_tags(&self) -> String {
        self.tags.join(" ")
    }
}

/// The full entry set, loaded once and read-only afterwards. Searches
/// filter and reorder views over it; entries themselves are never mutated.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<Entry>,
}

impl Catalog {
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    /// The dataset compiled into the binary.
    pub fn embedded() -> Self {
        let entries: Vec<Entry> =
            serde_json::from_str(EMBEDDED_CATALOG).expect("embedded catalog is valid JSON");
        Self { entries }
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, CatalogError> {
        let entries: Vec<Entry> = serde_json::from_reader(reader)?;
        Ok(Self { entries })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        Self::from_reader(File::open(path)?)
    }

    /// Startup loader: an explicit path that fails to load is reported and
    /// leaves the catalog empty, so every later query returns no results
    /// instead of an error. No path means the embedded dataset.
    pub fn load_or_empty(path: Option<&Path>) -> Self {
        match path {
            None => Self::embedded(),
            Some(path) => match Self::from_path(path) {
                Ok(catalog) => {
                    info!(path = %path.display(), entries = catalog.len(), "loaded catalog");
                    catalog
                }
                Err(err) => {
                    error!(path = %path.display(), %err, "failed to load catalog");
                    Self::default()
                }
            },
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Case-insensitive exact title lookup.
    pub fn by_title(&self, title: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|entry| entry.title.eq_ignore_ascii_case(title))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "io error: {err}"),
            CatalogError::Parse(err) => write!(f, "catalog parse error: {err}"),
        }
    }
}

impl Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(value: std::io::Error) -> Self {
        CatalogError::Io(value)
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(value: serde_json::Error) -> Self {
        CatalogError::Parse(value)
    }
}
