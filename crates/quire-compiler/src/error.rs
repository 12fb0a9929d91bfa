use miette::Diagnostic;
use quire_common::{DocumentId, ServiceError};
use thiserror::Error;

const REAUTH_ADVICE: &str = "the access token looks expired or revoked; sign in again and retry";

fn advice_for(err: &ServiceError) -> Option<String> {
    err.is_auth_expired().then(|| REAUTH_ADVICE.to_owned())
}

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("markdown event stream is unbalanced")]
    #[diagnostic(code(quire::parse::unbalanced))]
    Unbalanced,
}

/// Failure of the table stage. Only fatal when `strict_tables` is set.
#[derive(Debug, Error, Diagnostic)]
pub enum TableError {
    #[error("{missing} of {expected} table placeholders were not found in the document")]
    #[diagnostic(code(quire::tables::placeholder_missing))]
    PlaceholderMissing { expected: usize, missing: usize },

    #[error("expected {expected} tables after inserting skeletons, found {found}")]
    #[diagnostic(code(quire::tables::count_mismatch))]
    CountMismatch { expected: usize, found: usize },

    #[error(
        "table {ordinal} has {found_rows}x{found_columns} cells, expected {rows}x{columns}"
    )]
    #[diagnostic(code(quire::tables::shape_mismatch))]
    ShapeMismatch {
        ordinal: usize,
        rows: usize,
        columns: usize,
        found_rows: usize,
        found_columns: usize,
    },

    #[error("tables {ordinals:?} are nested inside other tables, which is not supported")]
    #[diagnostic(code(quire::tables::nested))]
    NestedUnsupported { ordinals: Vec<usize> },

    #[error("markers for tables {ordinals:?} appear more than once, so none were replaced")]
    #[diagnostic(code(quire::tables::ambiguous_placeholder))]
    AmbiguousPlaceholder { ordinals: Vec<usize> },

    #[error("document service failed during table materialization")]
    #[diagnostic(code(quire::tables::service))]
    Service(#[source] ServiceError),
}

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error("failed to parse markdown")]
    #[diagnostic(code(quire::export::parse))]
    Parse(#[from] ParseError),

    #[error("failed to create document: {source}")]
    #[diagnostic(code(quire::export::create))]
    CreateDocument {
        #[source]
        source: ServiceError,
        #[help]
        advice: Option<String>,
    },

    #[error("failed to write document {document}: {source}")]
    #[diagnostic(code(quire::export::commit))]
    CommitStructure {
        document: DocumentId,
        #[source]
        source: ServiceError,
        #[help]
        advice: Option<String>,
    },

    #[error("tables in document {document} could not be completed")]
    #[diagnostic(
        code(quire::export::tables),
        help("the document holds all non-table content; rerun without strict_tables to accept partial tables")
    )]
    Tables {
        document: DocumentId,
        #[source]
        source: TableError,
    },
}

impl ExportError {
    pub fn create_document(source: ServiceError) -> Self {
        let advice = advice_for(&source);
        ExportError::CreateDocument { source, advice }
    }

    pub fn commit_structure(document: DocumentId, source: ServiceError) -> Self {
        let advice = advice_for(&source);
        ExportError::CommitStructure {
            document,
            source,
            advice,
        }
    }

    /// The remote document, if one was created before the failure.
    pub fn document(&self) -> Option<&DocumentId> {
        match self {
            ExportError::CommitStructure { document, .. }
            | ExportError::Tables { document, .. } => Some(document),
            _ => None,
        }
    }
}
