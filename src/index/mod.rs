//! Vector index over the document corpus.

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteVectorIndex;
pub use store::{StoredChunk, VectorIndex};
