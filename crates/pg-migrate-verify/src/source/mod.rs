//! Chunk sources: where the rows of each side come from.
//!
//! The reconciler never performs I/O. A [`ChunkSource`] hands it successive
//! pages of rows in ascending primary key order; an empty page means the side
//! is exhausted.

pub mod postgres;
pub mod tls;

pub use postgres::{HealthStatus, PostgresChunkSource};

use async_trait::async_trait;

use crate::core::{Chunk, Row};
use crate::error::Result;

/// Produces successive, non-overlapping, ascending-key chunks for one side.
#[async_trait]
pub trait ChunkSource: Send {
    /// Fetch the next chunk. An empty chunk signals end of stream; callers do
    /// not poll again afterwards.
    async fn next_chunk(&mut self) -> Result<Chunk>;

    /// Table the source reads, once known. Sources that discover their
    /// table lazily report it after the first fetch.
    fn table_name(&self) -> Option<String> {
        None
    }

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: ChunkSource + ?Sized> ChunkSource for Box<T> {
    async fn next_chunk(&mut self) -> Result<Chunk> {
        (**self).next_chunk().await
    }

    fn table_name(&self) -> Option<String> {
        (**self).table_name()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Serves pre-loaded rows in pages of `chunk_size`.
///
/// Rows are served in the order given; they are not sorted here, so tests can
/// feed deliberately broken input through the same path as real data.
#[derive(Debug)]
pub struct MemoryChunkSource {
    name: String,
    rows: std::vec::IntoIter<Row>,
    chunk_size: usize,
}

impl MemoryChunkSource {
    /// Create a source over `rows`. A zero chunk size is treated as 1.
    pub fn new(name: impl Into<String>, rows: Vec<Row>, chunk_size: usize) -> Self {
        Self {
            name: name.into(),
            rows: rows.into_iter(),
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait]
impl ChunkSource for MemoryChunkSource {
    async fn next_chunk(&mut self) -> Result<Chunk> {
        Ok(self.rows.by_ref().take(self.chunk_size).collect())
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::int_row;

    #[tokio::test]
    async fn test_memory_source_pages_then_exhausts() {
        let rows: Vec<Row> = (1..=5).map(|k| int_row(&[k, k])).collect();
        let mut source = MemoryChunkSource::new("a", rows, 2);

        assert_eq!(source.next_chunk().await.unwrap().len(), 2);
        assert_eq!(source.next_chunk().await.unwrap().len(), 2);
        let last = source.next_chunk().await.unwrap();
        assert_eq!(last, vec![int_row(&[5, 5])]);
        assert!(source.next_chunk().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_boxed_source_delegates() {
        let mut source: Box<dyn ChunkSource> =
            Box::new(MemoryChunkSource::new("b", vec![int_row(&[1])], 0));
        assert_eq!(source.describe(), "memory:b");
        assert_eq!(source.next_chunk().await.unwrap().len(), 1);
        assert!(source.next_chunk().await.unwrap().is_empty());
    }
}
