use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{FieldValue, Record};
use crate::normalize::normalize_number;
use crate::status::Status;


#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("failed to access data file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to decode data file {path:?}: {source}")]
    Decode { path: PathBuf, source: serde_json::Error },

    #[error("failed to encode data file {path:?}: {source}")]
    Encode { path: PathBuf, source: serde_json::Error },

    #[error("data file {path:?} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("unsupported query on collection {collection:?}: {reason}")]
    UnsupportedQuery { collection: String, reason: &'static str },

    #[error("store write lock is poisoned")]
    Poisoned,
}

/// A stored document as the store hands it out, before any coercion.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FieldFilter {
    AtOrAfter { field: &'static str, at: DateTime<Utc> },
    Before { field: &'static str, at: DateTime<Utc> },
    StatusIn { field: &'static str, statuses: Vec<Status> },
    GreaterThan { field: &'static str, value: f64 },
}

pub(crate) trait DocumentStore: Send + Sync {
    fn stream(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Documents matching every filter. Stores may refuse filter combinations they cannot serve.
    fn query(&self, collection: &str, filters: &[FieldFilter]) -> Result<Vec<Document>, StoreError>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Stores a new document and returns its generated identifier.
    fn add(&self, collection: &str, data: Map<String, Value>) -> Result<String, StoreError>;
}

/// All collections in one JSON file shaped `{collection: {id: document}}`.
///
/// The file is read afresh on every call; nothing is cached. Writes hold a lock so concurrent
/// additions do not clobber each other, reads do not.
pub(crate) struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}


impl Document {
    pub fn into_record(self) -> Record {
        let fields = self.data.into_iter()
            .map(|(k, v)| (k, FieldValue::from(v)))
            .collect();
        Record::new(self.id, fields)
    }
}

impl FieldFilter {
    /// `[start, end)` on a timestamp field.
    pub fn within(field: &'static str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<FieldFilter> {
        vec![
            FieldFilter::AtOrAfter { field, at: start },
            FieldFilter::Before { field, at: end },
        ]
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            FieldFilter::AtOrAfter { field, at } => record.timestamp(field)
                .map_or(false, |ts| ts >= *at),
            FieldFilter::Before { field, at } => record.timestamp(field)
                .map_or(false, |ts| ts < *at),
            FieldFilter::StatusIn { field, statuses } => statuses
                .contains(&Status::of_value(record.get(field))),
            FieldFilter::GreaterThan { field, value } => normalize_number(record.get(field))
                .map_or(false, |n| n > *value),
        }
    }
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> JsonFileStore {
        JsonFileStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("data file {:?} does not exist yet; treating it as empty", self.path);
                return Ok(Map::new());
            },
            Err(e) => return Err(StoreError::Io { path: self.path.clone(), source: e }),
        };

        let root: Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| StoreError::Decode { path: self.path.clone(), source: e })?;
        match root {
            Value::Object(collections) => Ok(collections),
            _ => Err(StoreError::Malformed {
                path: self.path.clone(),
                reason: "top level is not an object".to_owned(),
            }),
        }
    }

    /// Writes a sibling temporary file and renames it over the data file, so readers see either
    /// the previous contents or the new ones.
    fn save(&self, collections: &Map<String, Value>) -> Result<(), StoreError> {
        let io_error = |e: io::Error| StoreError::Io { path: self.path.clone(), source: e };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let temp_file = NamedTempFile::new_in(dir)
            .map_err(io_error)?;
        {
            let mut writer = BufWriter::new(temp_file.as_file());
            serde_json::to_writer_pretty(&mut writer, collections)
                .map_err(|e| StoreError::Encode { path: self.path.clone(), source: e })?;
            writer.flush()
                .map_err(io_error)?;
        }
        temp_file.as_file().sync_all()
            .map_err(io_error)?;
        temp_file.persist(&self.path)
            .map_err(|e| io_error(e.error))?;
        Ok(())
    }

    fn documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let mut collections = self.load()?;
        let entries = match collections.remove(collection) {
            None => return Ok(Vec::new()),
            Some(Value::Object(entries)) => entries,
            Some(_) => return Err(StoreError::Malformed {
                path: self.path.clone(),
                reason: format!("collection {:?} is not an object", collection),
            }),
        };

        let mut documents = Vec::with_capacity(entries.len());
        for (id, data) in entries {
            match data {
                Value::Object(data) => documents.push(Document { id, data }),
                _ => warn!("skipping document {:?} in {:?}: not an object", id, collection),
            }
        }
        Ok(documents)
    }
}

impl DocumentStore for JsonFileStore {
    fn stream(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.documents(collection)
    }

    fn query(&self, collection: &str, filters: &[FieldFilter]) -> Result<Vec<Document>, StoreError> {
        if filters.len() > 1 {
            return Err(StoreError::UnsupportedQuery {
                collection: collection.to_owned(),
                reason: "composite filters are not indexed",
            });
        }

        let documents = self.documents(collection)?;
        Ok(documents.into_iter()
            .filter(|doc| filters.iter().all(|f| f.matches(&doc.clone().into_record())))
            .collect())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.documents(collection)?
            .into_iter()
            .find(|doc| doc.id == id))
    }

    fn add(&self, collection: &str, data: Map<String, Value>) -> Result<String, StoreError> {
        let _guard = self.write_lock.lock()
            .map_err(|_| StoreError::Poisoned)?;

        let mut collections = self.load()?;
        let entries = collections
            .entry(collection.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let entries = match entries {
            Value::Object(entries) => entries,
            _ => return Err(StoreError::Malformed {
                path: self.path.clone(),
                reason: format!("collection {:?} is not an object", collection),
            }),
        };

        let id = Uuid::new_v4().simple().to_string();
        entries.insert(id.clone(), Value::Object(data));
        self.save(&collections)?;
        Ok(id)
    }
}
