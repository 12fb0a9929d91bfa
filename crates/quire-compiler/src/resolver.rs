//! Asset side-channel: diagrams (and optionally tables) to hosted image URLs.
//!
//! Resolution runs before any document mutation. Every target goes through
//! render, mount, capture, release and upload in turn; the viewport holds at
//! most one element, so targets are processed strictly one after another.
//! A failing target is logged and left out of the map, which makes the
//! emitter skip it.

use std::collections::HashMap;
use std::sync::Arc;

use quire_common::assets::{
    AssetError, AssetKind, AssetStore, CaptureError, CaptureOptions, DiagramRenderer, Rasterizer,
    RenderedElement,
};
use quire_common::{ExportOptions, TableStrategy};
use tokio::sync::{Mutex, MutexGuard};

use crate::ast::{Document, Node, NodeId, NodeKind};

/// Node id to hosted image URL. Absent entries mean "no asset".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetMap(HashMap<NodeId, String>);

impl AssetMap {
    pub fn get(&self, id: NodeId) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    pub fn insert(&mut self, id: NodeId, url: String) {
        self.0.insert(id, url);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The single off-screen mount point renders are captured from.
#[derive(Debug, Default)]
pub struct Viewport {
    slot: Mutex<Option<RenderedElement>>,
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of the viewport.
    pub async fn acquire(&self) -> ViewportGuard<'_> {
        ViewportGuard {
            slot: self.slot.lock().await,
        }
    }

    /// Whether an element is currently mounted.
    pub fn is_occupied(&self) -> bool {
        self.slot.try_lock().map(|slot| slot.is_some()).unwrap_or(true)
    }
}

/// Exclusive access to the viewport. Dropping the guard unmounts.
pub struct ViewportGuard<'a> {
    slot: MutexGuard<'a, Option<RenderedElement>>,
}

impl ViewportGuard<'_> {
    pub fn mount(&mut self, element: RenderedElement) -> &RenderedElement {
        self.slot.insert(element)
    }

    pub fn mounted(&self) -> Option<&RenderedElement> {
        self.slot.as_ref()
    }
}

impl Drop for ViewportGuard<'_> {
    fn drop(&mut self) {
        self.slot.take();
    }
}

/// One node that needs an image.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetTarget<'a> {
    pub id: NodeId,
    pub kind: AssetKind,
    pub source: &'a str,
}

/// Targets in document order.
pub fn collect_targets<'a>(
    document: &'a Document,
    options: &ExportOptions,
) -> Vec<AssetTarget<'a>> {
    document
        .nodes()
        .filter_map(|node| target_for(node, options))
        .collect()
}

fn target_for<'a>(node: &'a Node, options: &ExportOptions) -> Option<AssetTarget<'a>> {
    match &node.kind {
        NodeKind::Code {
            lang: Some(lang),
            value,
        } if options.is_diagram_language(lang) => Some(AssetTarget {
            id: node.id,
            kind: AssetKind::Diagram {
                language: lang.to_ascii_lowercase(),
            },
            source: value,
        }),
        NodeKind::Table { source } if options.table_strategy == TableStrategy::Image => {
            Some(AssetTarget {
                id: node.id,
                kind: AssetKind::Table,
                source,
            })
        }
        _ => None,
    }
}

/// A target that could not be turned into an image.
#[derive(Debug)]
pub struct AssetFailure {
    pub node: NodeId,
    pub kind: AssetKind,
    pub error: AssetError,
}

#[derive(Debug, Default)]
pub struct ResolvedAssets {
    pub map: AssetMap,
    pub failures: Vec<AssetFailure>,
}

pub struct AssetResolver<R, C, S> {
    renderer: R,
    rasterizer: C,
    store: S,
    viewport: Arc<Viewport>,
    capture: CaptureOptions,
    theme: String,
}

impl<R, C, S> AssetResolver<R, C, S>
where
    R: DiagramRenderer,
    C: Rasterizer,
    S: AssetStore,
{
    pub fn new(renderer: R, rasterizer: C, store: S) -> Self {
        Self {
            renderer,
            rasterizer,
            store,
            viewport: Arc::new(Viewport::new()),
            capture: CaptureOptions::default(),
            theme: "default".to_owned(),
        }
    }

    /// Mount renders on a viewport shared with other owners.
    pub fn with_viewport(mut self, viewport: Arc<Viewport>) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_capture(mut self, capture: CaptureOptions) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Resolve every target in `document`. Never fails as a whole.
    #[tracing::instrument(skip_all)]
    pub async fn resolve(&self, document: &Document, options: &ExportOptions) -> ResolvedAssets {
        let mut resolved = ResolvedAssets::default();
        for target in collect_targets(document, options) {
            match self.resolve_one(&target).await {
                Ok(url) => {
                    tracing::debug!(node = %target.id, %url, "asset resolved");
                    resolved.map.insert(target.id, url);
                }
                Err(error) => {
                    tracing::warn!(
                        node = %target.id,
                        kind = target.kind.label(),
                        error = %error,
                        "asset failed, leaving it out"
                    );
                    resolved.failures.push(AssetFailure {
                        node: target.id,
                        kind: target.kind,
                        error,
                    });
                }
            }
        }
        resolved
    }

    async fn resolve_one(&self, target: &AssetTarget<'_>) -> Result<String, AssetError> {
        // Held from render to capture; a failed render releases it on return.
        let mut guard = self.viewport.acquire().await;
        let element = self
            .renderer
            .render(target.source, &target.kind, &self.theme)
            .await?;
        guard.mount(element);
        let captured = capture_mounted(&guard, &self.rasterizer, &self.capture).await;
        drop(guard);
        let image = captured?;
        Ok(self.store.upload(&image).await?)
    }
}

/// Capture whatever is currently mounted.
pub async fn capture_mounted<C: Rasterizer>(
    guard: &ViewportGuard<'_>,
    rasterizer: &C,
    options: &CaptureOptions,
) -> Result<quire_common::assets::RasterImage, CaptureError> {
    let element = guard.mounted().ok_or(CaptureError::NothingMounted)?;
    rasterizer.capture(element, options).await
}
