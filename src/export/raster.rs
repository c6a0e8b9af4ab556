use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use log::trace;
use resvg::tiny_skia::{Color, ColorU8, Pixmap, PixmapPaint, Transform};
use resvg::usvg;

use super::ExportError;
use super::bounds::ResolvedBounds;

/// What sits behind the diagram in the final canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backdrop {
    Transparent,
    Solid([u8; 3]),
}

/// Everything the painter needs besides the tree and its bounds.
#[derive(Debug, Clone, Copy)]
pub struct RasterPlan {
    pub supersample: f32,
    pub padding: f32,
    pub backdrop: Backdrop,
    /// Invert and hue-rotate the content for a dark presentation.
    pub invert: bool,
}

/// Transparent pixmap the content is drawn into before it is composited.
struct ScratchLayer {
    pixmap: Pixmap,
}

impl ScratchLayer {
    fn new(width: u32, height: u32) -> Result<Self, ExportError> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            ExportError::encoder("canvas", format!("cannot allocate {width}x{height} layer"))
        })?;
        trace!(width, height; "Allocated scratch layer");
        Ok(Self { pixmap })
    }
}

impl Drop for ScratchLayer {
    fn drop(&mut self) {
        trace!(width = self.pixmap.width(), height = self.pixmap.height(); "Released scratch layer");
    }
}

/// Draw `tree` into a padded canvas sized from `bounds`.
pub fn paint(
    tree: &usvg::Tree,
    bounds: &ResolvedBounds,
    plan: &RasterPlan,
) -> Result<Pixmap, ExportError> {
    let s = plan.supersample;
    let logical_w = bounds.size.width + plan.padding * 2.0;
    let logical_h = bounds.size.height + plan.padding * 2.0;
    let width = (logical_w * s).ceil() as u32;
    let height = (logical_h * s).ceil() as u32;

    let mut layer = ScratchLayer::new(width, height)?;

    let k = bounds.content_scale();
    let region = bounds.region;
    let off_x = plan.padding + (bounds.size.width - region.width * k) / 2.0;
    let off_y = plan.padding + (bounds.size.height - region.height * k) / 2.0;
    let transform = Transform::from_row(
        s * k,
        0.0,
        0.0,
        s * k,
        s * (off_x - k * region.x),
        s * (off_y - k * region.y),
    );
    resvg::render(tree, transform, &mut layer.pixmap.as_mut());

    if plan.invert {
        invert_hue_rotate(&mut layer.pixmap);
    }

    let mut canvas = Pixmap::new(width, height).ok_or_else(|| {
        ExportError::encoder("canvas", format!("cannot allocate {width}x{height} canvas"))
    })?;
    if let Backdrop::Solid([r, g, b]) = plan.backdrop {
        canvas.fill(Color::from_rgba8(r, g, b, 255));
    }
    canvas.draw_pixmap(
        0,
        0,
        layer.pixmap.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );

    Ok(canvas)
}

/// Row-major 3x3 matrix of the `hue-rotate()` filter function.
fn hue_rotate_matrix(degrees: f32) -> [[f32; 3]; 3] {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

/// `invert(1) hue-rotate(180deg)` applied to straight (unpremultiplied) color.
fn dark_filter(rgb: [u8; 3]) -> [u8; 3] {
    let m = hue_rotate_matrix(180.0);
    let inv = rgb.map(|c| f32::from(255 - c));
    let mut out = [0u8; 3];
    for (slot, row) in out.iter_mut().zip(m.iter()) {
        let v = row[0] * inv[0] + row[1] * inv[1] + row[2] * inv[2];
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

fn invert_hue_rotate(pixmap: &mut Pixmap) {
    for pixel in pixmap.pixels_mut() {
        if pixel.alpha() == 0 {
            continue;
        }
        let c = pixel.demultiply();
        let [r, g, b] = dark_filter([c.red(), c.green(), c.blue()]);
        *pixel = ColorU8::from_rgba(r, g, b, c.alpha()).premultiply();
    }
}

pub fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>, ExportError> {
    let rgba: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();

    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(&rgba, pixmap.width(), pixmap.height(), ExtendedColorType::Rgba8)
        .map_err(|e| ExportError::encoder("PNG", e.to_string()))?;
    Ok(out)
}

/// Encode as JPEG, flattening any remaining transparency onto white.
pub fn encode_jpeg(pixmap: &Pixmap, quality: u8) -> Result<Vec<u8>, ExportError> {
    let rgb: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let cover = 255 - p.alpha();
            [
                p.red().saturating_add(cover),
                p.green().saturating_add(cover),
                p.blue().saturating_add(cover),
            ]
        })
        .collect();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .write_image(&rgb, pixmap.width(), pixmap.height(), ExtendedColorType::Rgb8)
        .map_err(|e| ExportError::encoder("JPEG", e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::bounds::BoundsTier;
    use crate::geometry::{Region, Size};

    fn tree(svg: &str) -> usvg::Tree {
        usvg::Tree::from_str(svg, &usvg::Options::default()).unwrap()
    }

    fn bounds(w: f32, h: f32) -> ResolvedBounds {
        ResolvedBounds {
            region: Region::new(0.0, 0.0, w, h),
            size: Size::new(w, h),
            tier: BoundsTier::Attributes,
        }
    }

    const BLACK_SQUARE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10" fill="black"/></svg>"#;

    #[test]
    fn dark_filter_maps_black_to_white_and_keeps_grey() {
        assert_eq!(dark_filter([0, 0, 0]), [255, 255, 255]);
        assert_eq!(dark_filter([255, 255, 255]), [0, 0, 0]);
        let [r, g, b] = dark_filter([128, 128, 128]);
        assert!(r.abs_diff(127) <= 1 && g.abs_diff(127) <= 1 && b.abs_diff(127) <= 1);
    }

    #[test]
    fn canvas_is_padded_and_supersampled() {
        let plan = RasterPlan {
            supersample: 2.0,
            padding: 20.0,
            backdrop: Backdrop::Transparent,
            invert: false,
        };
        let pixmap = paint(&tree(BLACK_SQUARE), &bounds(10.0, 10.0), &plan).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (100, 100));

        // Corner stays transparent; the centre holds the square.
        assert_eq!(pixmap.pixel(0, 0).unwrap().alpha(), 0);
        let centre = pixmap.pixel(50, 50).unwrap();
        assert_eq!((centre.red(), centre.alpha()), (0, 255));
    }

    #[test]
    fn dark_plan_inverts_content_but_not_backdrop() {
        let plan = RasterPlan {
            supersample: 1.0,
            padding: 5.0,
            backdrop: Backdrop::Solid([26, 26, 26]),
            invert: true,
        };
        let pixmap = paint(&tree(BLACK_SQUARE), &bounds(10.0, 10.0), &plan).unwrap();
        let corner = pixmap.pixel(0, 0).unwrap();
        assert_eq!((corner.red(), corner.alpha()), (26, 255));
        let centre = pixmap.pixel(10, 10).unwrap();
        assert_eq!(centre.red(), 255);
    }

    #[test]
    fn encoders_produce_their_formats() {
        let plan = RasterPlan {
            supersample: 1.0,
            padding: 0.0,
            backdrop: Backdrop::Transparent,
            invert: false,
        };
        let pixmap = paint(&tree(BLACK_SQUARE), &bounds(10.0, 10.0), &plan).unwrap();

        let png = encode_png(&pixmap).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let jpeg = encode_jpeg(&pixmap, 92).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
