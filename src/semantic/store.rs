//! Vector store collections.
//!
//! A store holds named collections of embedded texts. Texts are embedded by
//! the store on upsert with the caller's [`Embedder`], and searched by
//! cosine similarity.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::PrepError;
use crate::semantic::embeddings::Embedder;
use crate::semantic::index::VectorIndex;
use crate::semantic::storage::VectorStorage;

/// Header model id of a collection no text was written to yet.
const UNASSIGNED_MODEL_ID: [u8; 32] = [0u8; 32];

/// A stored text and its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredText {
    pub text: String,
    pub score: f32,
}

pub trait VectorStore {
    fn collection_exists(&mut self, collection: &str) -> Result<bool, PrepError>;

    /// Remove `collection`. Returns whether it existed.
    fn drop_collection(&mut self, collection: &str) -> Result<bool, PrepError>;

    /// Create an empty cosine collection for `dimensions` long vectors.
    fn create_collection(&mut self, collection: &str, dimensions: usize) -> Result<(), PrepError>;

    /// Embed and append `texts`. Returns the number of points written.
    fn upsert_texts(
        &mut self,
        collection: &str,
        texts: &[String],
        embedder: &dyn Embedder,
    ) -> Result<usize, PrepError>;

    /// Up to `k` stored texts, most similar first.
    fn similarity_search(
        &mut self,
        collection: &str,
        query: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ScoredText>, PrepError>;

    /// Drop `collection` if present and create it fresh.
    fn reset_collection(&mut self, collection: &str, dimensions: usize) -> Result<(), PrepError> {
        if self.collection_exists(collection)? {
            log::info!("Deleting existing collection '{collection}'...");
            self.drop_collection(collection)?;
        }
        self.create_collection(collection, dimensions)
    }
}

struct LocalCollection {
    index: VectorIndex,
    storage: VectorStorage,
    model_id: [u8; 32],
}

/// File backed store, one `<collection>.bin` per collection under `root`.
pub struct LocalVectorStore {
    root: PathBuf,
    collections: HashMap<String, LocalCollection>,
}

impl LocalVectorStore {
    pub fn new(root: PathBuf) -> Result<Self, PrepError> {
        std::fs::create_dir_all(&root).map_err(|e| PrepError::io(&root, e))?;
        Ok(Self {
            root,
            collections: HashMap::new(),
        })
    }

    fn storage_for(&self, collection: &str) -> Result<VectorStorage, PrepError> {
        let valid = !collection.is_empty()
            && collection != "."
            && collection != ".."
            && !collection.contains(['/', '\\']);
        if !valid {
            return Err(PrepError::VectorStore(format!(
                "invalid collection name '{collection}'"
            )));
        }

        Ok(VectorStorage::new(self.root.join(format!("{collection}.bin"))))
    }

    /// Loaded collection, read from disk on first use.
    fn open(
        &mut self,
        collection: &str,
        embedder: &dyn Embedder,
    ) -> Result<&mut LocalCollection, PrepError> {
        if !self.collections.contains_key(collection) {
            let storage = self.storage_for(collection)?;
            if !storage.exists() {
                return Err(PrepError::VectorStore(format!(
                    "collection '{collection}' does not exist"
                )));
            }

            let model_id = match storage.stored_model_id()? {
                UNASSIGNED_MODEL_ID => UNASSIGNED_MODEL_ID,
                _ => embedder.model_id_hash(),
            };
            let index = storage.load(&model_id, embedder.dimensions())?;
            log::info!("Loaded {} vectors from {}", index.len(), storage.path().display());

            self.collections.insert(
                collection.to_string(),
                LocalCollection {
                    index,
                    storage,
                    model_id,
                },
            );
        }

        self.collections
            .get_mut(collection)
            .ok_or_else(|| PrepError::VectorStore(format!("collection '{collection}' not loaded")))
    }
}

impl VectorStore for LocalVectorStore {
    fn collection_exists(&mut self, collection: &str) -> Result<bool, PrepError> {
        if self.collections.contains_key(collection) {
            return Ok(true);
        }
        Ok(self.storage_for(collection)?.exists())
    }

    fn drop_collection(&mut self, collection: &str) -> Result<bool, PrepError> {
        let storage = self.storage_for(collection)?;
        let cached = self.collections.remove(collection).is_some();
        let on_disk = storage.delete()?;
        Ok(cached || on_disk)
    }

    fn create_collection(&mut self, collection: &str, dimensions: usize) -> Result<(), PrepError> {
        let storage = self.storage_for(collection)?;
        if self.collection_exists(collection)? {
            return Err(PrepError::VectorStore(format!(
                "collection '{collection}' already exists"
            )));
        }

        // the model is only known once texts arrive
        let index = VectorIndex::new(dimensions);
        let model_id = UNASSIGNED_MODEL_ID;
        storage.save(&index, &model_id)?;

        self.collections.insert(
            collection.to_string(),
            LocalCollection {
                index,
                storage,
                model_id,
            },
        );
        Ok(())
    }

    fn upsert_texts(
        &mut self,
        collection: &str,
        texts: &[String],
        embedder: &dyn Embedder,
    ) -> Result<usize, PrepError> {
        let col = self.open(collection, embedder)?;
        let model_id = embedder.model_id_hash();

        if col.model_id == UNASSIGNED_MODEL_ID {
            col.model_id = model_id;
        } else if col.model_id != model_id {
            return Err(PrepError::VectorStore(format!(
                "collection '{collection}' was built with a different model than '{}'",
                embedder.name()
            )));
        }

        let embeddings = embedder.embed_batch(texts)?;
        if embeddings.len() != texts.len() {
            return Err(PrepError::VectorStore(format!(
                "embedder returned {} vectors for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }

        // a rejected vector fails the whole batch before anything is inserted
        for embedding in &embeddings {
            col.index.check(embedding)?;
        }

        let mut next_id = col.index.next_id();
        for (text, embedding) in texts.iter().zip(embeddings) {
            col.index.insert(next_id, text.clone(), embedding)?;
            next_id += 1;
        }

        col.storage.save(&col.index, &col.model_id)?;
        Ok(texts.len())
    }

    fn similarity_search(
        &mut self,
        collection: &str,
        query: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ScoredText>, PrepError> {
        let col = self.open(collection, embedder)?;
        if col.index.is_empty() {
            return Ok(vec![]);
        }

        let query_embedding = embedder.embed(query)?;
        let results = col.index.search(&query_embedding, k)?;

        Ok(results
            .into_iter()
            .filter_map(|r| {
                col.index.get(r.id).map(|entry| ScoredText {
                    text: entry.text.clone(),
                    score: r.score,
                })
            })
            .collect())
    }
}
