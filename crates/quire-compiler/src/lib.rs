//! Markdown to remote rich-text document compiler.
//!
//! A document is exported in one [`DocumentCompiler::compile_and_export`]
//! run: the markdown is parsed into an id-numbered [`Document`], diagrams
//! are rendered and hosted by the [`AssetResolver`], the [`emitter`] turns
//! the tree into one ordered batch of position-addressed requests, and
//! [`tables`] fills in native tables once the service has committed the
//! rest.

pub mod ast;
pub mod compiler;
pub mod cursor;
pub mod emitter;
pub mod error;
pub mod parse;
pub mod resolver;
pub mod tables;

pub use ast::{Document, Node, NodeId, NodeKind};
pub use compiler::{
    DocumentCompiler, DryRun, ExportReport, ExportState, LogProgress, ProgressSink, dry_run,
};
pub use cursor::Cursor;
pub use emitter::{CompiledDocument, compile};
pub use error::{ExportError, ParseError, TableError};
pub use parse::parse;
pub use resolver::{AssetMap, AssetResolver, ResolvedAssets, Viewport};
pub use tables::{TableOutcome, TablePlan};
