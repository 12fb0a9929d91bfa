use super::{CaptureError, CaptureOptions, ElementFormat, RasterImage, RenderedElement, Rasterizer};

/// Captures elements that a renderer already produced in raster form.
///
/// Vector output cannot be captured here and is rejected, which the asset
/// resolver treats as a missing asset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotRasterizer;

impl Rasterizer for SnapshotRasterizer {
    async fn capture(
        &self,
        element: &RenderedElement,
        options: &CaptureOptions,
    ) -> Result<RasterImage, CaptureError> {
        if element.bytes.is_empty() {
            return Err(CaptureError::Blank);
        }
        match element.format {
            ElementFormat::Png => {
                tracing::trace!(
                    scale = options.scale,
                    background = %options.background_color,
                    "capturing raster element"
                );
                Ok(RasterImage {
                    bytes: element.bytes.clone(),
                    mime: ElementFormat::Png.mime(),
                    extension: "png",
                })
            }
            format => Err(CaptureError::UnsupportedFormat(format)),
        }
    }
}
