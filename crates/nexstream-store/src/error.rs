use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The query or write named a collection the store does not serve.
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// An increment targeted a document that does not exist.
    #[error("Record not found")]
    NotFound,

    /// A document failed a structural check on write.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}
