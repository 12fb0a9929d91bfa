//! Contracts and HTTP implementations for the asset side-channel.
//!
//! Turning a diagram into an embeddable image takes three collaborators:
//! a [`DiagramRenderer`] produces a rendered element from source text, a
//! [`Rasterizer`] captures that element as a raster image, and an
//! [`AssetStore`] publishes the image at a world-readable URL.

mod kroki;
mod raster;
mod store;

use std::future::Future;

use bytes::Bytes;
use miette::Diagnostic;
use thiserror::Error;

pub use kroki::KrokiRenderer;
pub use raster::SnapshotRasterizer;
pub use store::HttpAssetStore;

/// What a piece of source text describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKind {
    /// A fenced code block in a diagram language such as `mermaid`.
    Diagram { language: String },
    /// A markdown table, rendered whole.
    Table,
}

impl AssetKind {
    pub fn label(&self) -> &str {
        match self {
            AssetKind::Diagram { language } => language,
            AssetKind::Table => "table",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementFormat {
    Png,
    Svg,
}

impl ElementFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ElementFormat::Png => "image/png",
            ElementFormat::Svg => "image/svg+xml",
        }
    }
}

/// Output of a renderer, mounted on the viewport before capture.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedElement {
    pub format: ElementFormat,
    pub bytes: Bytes,
}

/// An encoded raster image ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub bytes: Bytes,
    pub mime: &'static str,
    pub extension: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    pub background_color: String,
    pub scale: f32,
    pub allow_cross_origin: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            background_color: "#ffffff".to_owned(),
            scale: 2.0,
            allow_cross_origin: true,
        }
    }
}

impl From<&crate::config::RendererConfig> for CaptureOptions {
    fn from(config: &crate::config::RendererConfig) -> Self {
        Self {
            background_color: config.background_color.clone(),
            scale: config.scale,
            allow_cross_origin: true,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum RenderError {
    #[error("syntax error in {kind} source: {message}")]
    #[diagnostic(code(quire::assets::render::syntax))]
    Syntax { kind: String, message: String },

    #[error("renderer does not support {0}")]
    #[diagnostic(code(quire::assets::render::unsupported))]
    Unsupported(String),

    #[error("renderer unavailable: {0}")]
    #[diagnostic(code(quire::assets::render::transport))]
    Transport(#[from] reqwest::Error),

    #[error("renderer returned {status}: {message}")]
    #[diagnostic(code(quire::assets::render::service))]
    Service { status: u16, message: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum CaptureError {
    #[error("cannot capture {0:?} element")]
    #[diagnostic(code(quire::assets::capture::format))]
    UnsupportedFormat(ElementFormat),

    #[error("nothing is mounted on the viewport")]
    #[diagnostic(code(quire::assets::capture::empty))]
    NothingMounted,

    #[error("rendered element is empty")]
    #[diagnostic(code(quire::assets::capture::blank))]
    Blank,
}

#[derive(Debug, Error, Diagnostic)]
pub enum UploadError {
    #[error("upload failed: {0}")]
    #[diagnostic(code(quire::assets::upload::transport))]
    Transport(#[from] reqwest::Error),

    #[error("asset store rejected upload with {status}: {message}")]
    #[diagnostic(code(quire::assets::upload::rejected))]
    Rejected { status: u16, message: String },

    #[error("invalid asset URL: {0}")]
    #[diagnostic(code(quire::assets::upload::url))]
    InvalidUrl(#[from] url::ParseError),
}

/// Any failure on the way from source text to hosted URL.
#[derive(Debug, Error, Diagnostic)]
pub enum AssetError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Upload(#[from] UploadError),
}

pub trait DiagramRenderer {
    fn render(
        &self,
        source: &str,
        kind: &AssetKind,
        theme: &str,
    ) -> impl Future<Output = Result<RenderedElement, RenderError>>;
}

pub trait Rasterizer {
    fn capture(
        &self,
        element: &RenderedElement,
        options: &CaptureOptions,
    ) -> impl Future<Output = Result<RasterImage, CaptureError>>;
}

pub trait AssetStore {
    /// Publish `image`, returning a URL readable without authentication.
    fn upload(&self, image: &RasterImage) -> impl Future<Output = Result<String, UploadError>>;
}
