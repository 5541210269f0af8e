/// HNSW vector index for similarity search over document embeddings
use crate::retrieval::Document;
use hnsw_rs::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

const MAX_LAYER: usize = 16;
const CAPACITY_HINT: usize = 10_000;

/// In-memory approximate nearest-neighbour index using cosine
/// similarity, with a side table mapping HNSW ids back to documents.
pub struct VectorIndex {
    index: Hnsw<'static, f32, DistCosine>,
    documents: Vec<Document>,
    dimension: usize,
}

impl VectorIndex {
    pub fn new(dimension: usize, ef_construction: usize, m: usize) -> Self {
        let index = Hnsw::new(m, CAPACITY_HINT, MAX_LAYER, ef_construction, DistCosine);
        Self {
            index,
            documents: Vec::new(),
            dimension,
        }
    }

    pub fn insert(
        &mut self,
        document: Document,
        embedding: &[f32],
    ) -> Result<(), VectorIndexError> {
        if embedding.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let data = embedding.to_vec();
        self.index.insert((&data, self.documents.len()));
        self.documents.push(document);
        Ok(())
    }

    /// K nearest neighbours for `query`, best first, as
    /// (document, cosine similarity) pairs.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<(Document, f32)>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.documents.is_empty() {
            return Ok(Vec::new());
        }

        let neighbours = self.index.search(query, k, ef_search);
        Ok(neighbours
            .into_iter()
            .filter_map(|n| {
                self.documents
                    .get(n.d_id)
                    .map(|document| (document.clone(), 1.0 - n.distance))
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}
