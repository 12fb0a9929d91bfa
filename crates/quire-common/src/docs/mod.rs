//! Wire model and client for the remote rich-text document service.
//!
//! Positions everywhere in this module are indices into the linear
//! representation of the remote document, counted in UTF-16 code units.
//! Index 0 is the implicit document start, so content begins at 1.

mod client;
mod request;
mod snapshot;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

pub use client::GoogleDocsClient;
pub use request::{
    BatchUpdate, Color, Dimension, Link, Location, NamedStyleType, OptionalColor, ParagraphStyle,
    Range, Request, RgbColor, Size, TextStyle, WeightedFontFamily,
};
pub use snapshot::{
    Body, DocumentSnapshot, Paragraph, ParagraphElement, StructuralElement, Table, TableCell,
    TableRow, TextRun,
};

/// Identifier of a remote document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The remote document service.
///
/// `batch_update` applies requests strictly in slice order; each request's
/// positions are resolved against the document produced by the requests
/// before it in the same batch.
pub trait DocumentService {
    /// Create an empty document and return its identifier.
    fn create(&self, title: &str) -> impl Future<Output = Result<DocumentId, ServiceError>>;

    /// Apply an ordered batch of mutation requests.
    fn batch_update(
        &self,
        document: &DocumentId,
        requests: &[Request],
    ) -> impl Future<Output = Result<(), ServiceError>>;

    /// Fetch the current structure of a document.
    fn get(
        &self,
        document: &DocumentId,
    ) -> impl Future<Output = Result<DocumentSnapshot, ServiceError>>;
}

impl<T: DocumentService> DocumentService for &T {
    async fn create(&self, title: &str) -> Result<DocumentId, ServiceError> {
        (**self).create(title).await
    }

    async fn batch_update(
        &self,
        document: &DocumentId,
        requests: &[Request],
    ) -> Result<(), ServiceError> {
        (**self).batch_update(document, requests).await
    }

    async fn get(&self, document: &DocumentId) -> Result<DocumentSnapshot, ServiceError> {
        (**self).get(document).await
    }
}
