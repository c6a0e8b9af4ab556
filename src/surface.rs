use resvg::usvg;

use crate::fonts;
use crate::geometry::Size;
use crate::theme::ColorScheme;

/// An SVG document produced by a rendering engine, with its natural size.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorImage {
    svg: String,
    natural: Size,
    native_scheme: Option<ColorScheme>,
}

impl VectorImage {
    /// Wrap engine output. `native_scheme` is the scheme the engine itself themed the surface for,
    /// if it did.
    pub fn from_svg(svg: String, native_scheme: Option<ColorScheme>) -> Result<Self, String> {
        let tree = parse_tree(&svg)?;
        let natural = Size::new(tree.size().width(), tree.size().height());

        Ok(Self {
            svg,
            natural,
            native_scheme,
        })
    }

    pub fn svg(&self) -> &str {
        &self.svg
    }

    pub fn natural_size(&self) -> Size {
        self.natural
    }

    pub fn native_scheme(&self) -> Option<ColorScheme> {
        self.native_scheme
    }

    pub fn has_native_variant(&self, scheme: ColorScheme) -> bool {
        self.native_scheme == Some(scheme)
    }

    pub(crate) fn tree(&self) -> Result<usvg::Tree, String> {
        parse_tree(&self.svg)
    }
}

fn parse_tree(svg: &str) -> Result<usvg::Tree, String> {
    let opts = fonts::usvg_options();
    usvg::Tree::from_str(svg, &opts).map_err(|e| format!("Failed to parse SVG: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_size_comes_from_svg() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="80"><rect width="10" height="10"/></svg>"#;
        let image = VectorImage::from_svg(svg.to_string(), None).unwrap();
        assert_eq!(image.natural_size(), Size::new(120.0, 80.0));
        assert!(!image.has_native_variant(ColorScheme::Dark));
    }

    #[test]
    fn malformed_svg_is_rejected() {
        assert!(VectorImage::from_svg("<svg".to_string(), None).is_err());
    }
}
