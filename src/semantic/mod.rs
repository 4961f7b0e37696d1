//! Vector store infrastructure for activity embeddings.
//!
//! Activities are embedded with fastembed and written to a collection in
//! either a local file backed store or a Qdrant server.
//!
//! # Architecture
//!
//! - `embeddings`: Embedder trait and the fastembed implementation
//! - `index`: In-memory vector index with cosine similarity search
//! - `storage`: Binary file I/O for `<collection>.bin`
//! - `store`: VectorStore trait and the local backend
//! - `qdrant`: Qdrant REST backend
//! - `ingest`: Collection reset, batched upload and search helpers

pub mod embeddings;
mod index;
mod ingest;
mod qdrant;
mod storage;
mod store;

pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel};
pub use index::IndexError;
pub use ingest::{collection_name, import_activities, search_activities};
pub use qdrant::QdrantStore;
pub use storage::VectorStorageError;
pub use store::{LocalVectorStore, ScoredText, VectorStore};
