/// Tantivy keyword index for full-text retrieval over document bodies
use crate::retrieval::Document;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    Initialization(String),

    #[error("Insert failed: {0}")]
    Insert(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Tantivy error: {0}")]
    Tantivy(#[from] TantivyError),
}

/// In-memory full-text index with BM25 ranking.
///
/// Stores the explicit document id and metadata alongside the body so
/// hits come back as complete [`Document`]s. Matches are scoped to the
/// body field, mirroring a field-scoped match query against a search
/// service.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    id_field: Field,
    body_field: Field,
    metadata_field: Field,
}

impl KeywordIndex {
    pub fn new() -> Result<Self, KeywordIndexError> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("doc_id", STRING | STORED);
        let body_field = schema_builder.add_text_field("body", TEXT | STORED);
        let metadata_field = schema_builder.add_text_field("metadata", STORED);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let writer = index
            .writer(15_000_000)
            .map_err(|e| KeywordIndexError::Initialization(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e: TantivyError| KeywordIndexError::Initialization(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer,
            id_field,
            body_field,
            metadata_field,
        })
    }

    pub fn insert(&mut self, document: &Document) -> Result<(), KeywordIndexError> {
        let mut indexed = doc!(self.body_field => document.text.clone());
        if let Some(id) = &document.id {
            indexed.add_text(self.id_field, id);
        }
        if !document.metadata.is_empty() {
            let json = serde_json::to_string(&document.metadata)
                .map_err(|e| KeywordIndexError::Insert(e.to_string()))?;
            indexed.add_text(self.metadata_field, json);
        }

        self.writer
            .add_document(indexed)
            .map_err(|e| KeywordIndexError::Insert(e.to_string()))?;
        Ok(())
    }

    /// Commit pending inserts and reload the reader
    pub fn commit(&mut self) -> Result<(), KeywordIndexError> {
        self.writer
            .commit()
            .map_err(|e| KeywordIndexError::Insert(e.to_string()))?;
        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::Search(e.to_string()))?;
        Ok(())
    }

    /// Search the body field, best-first, bounded by `limit`.
    ///
    /// Free-text input is parsed leniently: unparsable fragments are
    /// dropped instead of failing the whole query.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Document>, KeywordIndexError> {
        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(&self.index, vec![self.body_field]);
        let (parsed, _lenient_errors) = query_parser.parse_query_lenient(query);

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::Search(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (_score, doc_address) in top_docs {
            let retrieved: tantivy::TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::Search(e.to_string()))?;

            let id = retrieved
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .map(str::to_string);

            let text = retrieved
                .get_first(self.body_field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            let metadata = retrieved
                .get_first(self.metadata_field)
                .and_then(|v| v.as_str())
                .and_then(|json| serde_json::from_str(json).ok())
                .unwrap_or_default();

            results.push(Document { id, text, metadata });
        }

        Ok(results)
    }

    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
