//! Loading activity texts into a vector store collection.

use indicatif::{ProgressBar, ProgressStyle};

use crate::errors::PrepError;
use crate::semantic::embeddings::Embedder;
use crate::semantic::store::{ScoredText, VectorStore};

/// Query run after loading to check the collection answers searches
const SMOKE_QUERY: &str = "test query";

/// Collection name for an embedding model: `/` is not allowed in names.
pub fn collection_name(model: &str) -> String {
    model.replace('/', "-")
}

/// Replace `collection` with the embeddings of `texts`.
///
/// The collection is dropped and recreated, then filled `batch_size` texts
/// at a time in input order. Returns the number of texts stored.
pub fn import_activities(
    texts: &[String],
    embedder: &dyn Embedder,
    store: &mut dyn VectorStore,
    collection: &str,
    batch_size: usize,
) -> Result<usize, PrepError> {
    if batch_size == 0 {
        return Err(PrepError::config("batch_size must be greater than 0"));
    }

    store.reset_collection(collection, embedder.dimensions())?;

    let progress = ProgressBar::new(texts.len() as u64).with_message("Adding activities");
    if let Ok(style) = ProgressStyle::with_template("{msg} {bar:40} {pos}/{len} [{elapsed_precise}]") {
        progress.set_style(style);
    }

    let mut stored = 0;
    for batch in texts.chunks(batch_size) {
        stored += store.upsert_texts(collection, batch, embedder)?;
        progress.inc(batch.len() as u64);
    }
    progress.finish_and_clear();

    if stored > 0 {
        let found = store.similarity_search(collection, SMOKE_QUERY, stored, embedder)?;
        log::debug!("smoke query matched {} of {stored} points", found.len());
    }

    log::info!("Loaded {stored} activities into vector store");
    Ok(stored)
}

/// Top `k` texts in `collection` for `query`.
pub fn search_activities(
    query: &str,
    embedder: &dyn Embedder,
    store: &mut dyn VectorStore,
    collection: &str,
    k: usize,
) -> Result<Vec<ScoredText>, PrepError> {
    if !store.collection_exists(collection)? {
        return Err(PrepError::VectorStore(format!(
            "collection '{collection}' does not exist"
        )));
    }
    store.similarity_search(collection, query, k, embedder)
}
