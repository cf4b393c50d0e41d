use tracing::{debug, warn};

use crate::model::Record;
use crate::store::{Document, DocumentStore, FieldFilter, StoreError};


/// Every document of `collection`, with its identifier attached and its fields coerced.
pub(crate) fn scan(store: &dyn DocumentStore, collection: &str) -> Result<Vec<Record>, StoreError> {
    let documents = store.stream(collection)?;
    Ok(documents.into_iter().map(Document::into_record).collect())
}

/// The documents of `collection` passing all `filters`.
///
/// If the store cannot answer the filtered query, the whole collection is scanned and filtered
/// here instead.
pub(crate) fn scan_where(
    store: &dyn DocumentStore,
    collection: &str,
    filters: &[FieldFilter],
) -> Result<Vec<Record>, StoreError> {
    match store.query(collection, filters) {
        Ok(documents) => Ok(documents.into_iter().map(Document::into_record).collect()),
        Err(e) => {
            match &e {
                StoreError::UnsupportedQuery { .. } => debug!("{}; filtering a full scan instead", e),
                _ => warn!("filtered query on {:?} failed ({}); filtering a full scan instead", collection, e),
            }
            let records = scan(store, collection)?;
            Ok(records.into_iter()
                .filter(|r| filters.iter().all(|f| f.matches(r)))
                .collect())
        },
    }
}
