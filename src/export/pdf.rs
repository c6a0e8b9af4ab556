use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use serde::Serialize;

use super::ExportError;
use crate::geometry::Size;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Page geometry in PDF points. The image sits at `(margin, margin)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageLayout {
    pub page: Size,
    pub image: Size,
    pub margin: f32,
    pub orientation: Orientation,
}

impl PageLayout {
    pub fn for_image(image: Size, margin: f32) -> Self {
        let orientation = if image.width > image.height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        };
        Self {
            page: Size::new(image.width + margin * 2.0, image.height + margin * 2.0),
            image,
            margin,
            orientation,
        }
    }
}

/// Embed `png` as one image on a page matching its aspect ratio.
///
/// `density` is the number of raster pixels per page point.
pub fn encode_pdf(
    png: &[u8],
    density: f32,
    margin: f32,
    backdrop: &str,
) -> Result<Vec<u8>, ExportError> {
    let dims = imagesize::blob_size(png).map_err(|e| ExportError::encoder("PDF", e.to_string()))?;
    let density = if density > 0.0 { density } else { 1.0 };
    let image = Size::new(dims.width as f32 / density, dims.height as f32 / density);
    let layout = PageLayout::for_image(image, margin);
    debug!(
        width = layout.page.width,
        height = layout.page.height,
        orientation:? = layout.orientation;
        "PDF page layout"
    );

    let wrapper = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{pw}" height="{ph}" viewBox="0 0 {pw} {ph}"><rect width="{pw}" height="{ph}" fill="{backdrop}"/><image x="{m}" y="{m}" width="{iw}" height="{ih}" preserveAspectRatio="none" xlink:href="data:image/png;base64,{data}"/></svg>"#,
        pw = layout.page.width,
        ph = layout.page.height,
        m = layout.margin,
        iw = layout.image.width,
        ih = layout.image.height,
        backdrop = crate::xml::escape_xml(backdrop),
        data = STANDARD.encode(png),
    );

    let opts = svg2pdf::usvg::Options::default();
    let tree = svg2pdf::usvg::Tree::from_str(&wrapper, &opts)
        .map_err(|e| ExportError::encoder("PDF", format!("Failed to parse page: {}", e)))?;

    svg2pdf::to_pdf(
        &tree,
        svg2pdf::ConversionOptions::default(),
        svg2pdf::PageOptions::default(),
    )
    .map_err(|e| ExportError::encoder("PDF", e.to_string()))
}
