use log::debug;
use resvg::usvg::{self, Node};

use crate::geometry::{Region, Size};
use crate::xml::{self, RootAttributes};

use super::ExportOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsTier {
    Attributes,
    ViewBox,
    ContentBox,
    Displayed,
    Traversal,
}

/// Every candidate region a surface offers, before precedence is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceProbe {
    pub attributes: Option<Region>,
    pub view_box: Option<Region>,
    pub content: Option<Region>,
    pub displayed: Option<Region>,
    pub traversal: Option<Region>,
    pub has_content: bool,
}

impl SurfaceProbe {
    pub fn of(svg: &str, tree: &usvg::Tree) -> Self {
        let root_attrs = match xml::read_root_attributes(svg) {
            Ok(attrs) => attrs.unwrap_or_default(),
            Err(e) => {
                debug!(error:% = e; "Could not read root attributes");
                RootAttributes::default()
            }
        };

        let attributes = match (
            root_attrs.width.as_deref().and_then(xml::absolute_length),
            root_attrs.height.as_deref().and_then(xml::absolute_length),
        ) {
            (Some(w), Some(h)) => Some(Region::from_size(Size::new(w, h))),
            _ => None,
        };
        let viewport = Size::new(tree.size().width(), tree.size().height());
        let view_box = root_attrs
            .view_box
            .as_deref()
            .and_then(xml::parse_view_box)
            .map(|(_, _, w, h)| {
                place_view_box(
                    Size::new(w, h),
                    root_attrs.preserve_aspect_ratio.as_deref(),
                    viewport,
                )
            });

        let root = tree.root();
        let content = root.has_children().then(|| to_region(root.abs_bounding_box()));
        let displayed = Some(Region::from_size(viewport));
        let traversal = traverse(root);

        Self {
            attributes,
            view_box,
            content,
            displayed,
            traversal,
            has_content: root.has_children(),
        }
    }
}

/// Where a root `viewBox` of size `view_box` lands inside the parsed tree's viewport.
fn place_view_box(view_box: Size, aspect: Option<&str>, viewport: Size) -> Region {
    let mut parts = aspect.unwrap_or_default().split_whitespace().peekable();
    if parts.peek() == Some(&"defer") {
        parts.next();
    }
    let align = parts.next().unwrap_or("xMidYMid");
    if align == "none" {
        return Region::from_size(viewport);
    }
    let slice = parts.next() == Some("slice");

    let sx = viewport.width / view_box.width;
    let sy = viewport.height / view_box.height;
    let scale = if slice { sx.max(sy) } else { sx.min(sy) };
    let placed = Size::new(view_box.width * scale, view_box.height * scale);

    let fraction = |min: &str, max: &str| {
        if align.contains(min) {
            0.0
        } else if align.contains(max) {
            1.0
        } else {
            0.5
        }
    };
    Region::new(
        (viewport.width - placed.width) * fraction("xMin", "xMax"),
        (viewport.height - placed.height) * fraction("YMin", "YMax"),
        placed.width,
        placed.height,
    )
}

fn to_region(rect: usvg::Rect) -> Region {
    Region::new(rect.x(), rect.y(), rect.width(), rect.height())
}

/// Union of the stroke bounds of every drawable leaf below `group`.
fn traverse(group: &usvg::Group) -> Option<Region> {
    group.children().iter().fold(None, |acc, node| {
        let next = match node {
            Node::Group(child) => traverse(child),
            leaf => Some(to_region(leaf.abs_stroke_bounding_box())),
        }
        .filter(Region::is_positive);

        match (acc, next) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        }
    })
}

/// The chosen source region and the output size it maps to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedBounds {
    pub region: Region,
    pub size: Size,
    pub tier: BoundsTier,
}

impl ResolvedBounds {
    /// Uniform content scale that fits the region into the output size without enlarging it.
    pub fn content_scale(&self) -> f32 {
        (self.size.width / self.region.width)
            .min(self.size.height / self.region.height)
            .min(1.0)
    }
}

/// Pick the export region by precedence and clamp its size.
///
/// Returns `None` when the surface has nothing to draw.
pub fn resolve_bounds(probe: &SurfaceProbe, options: &ExportOptions) -> Option<ResolvedBounds> {
    if !probe.has_content {
        return None;
    }

    let tiers = [
        (BoundsTier::Attributes, probe.attributes),
        (BoundsTier::ViewBox, probe.view_box),
        (BoundsTier::ContentBox, probe.content),
        (BoundsTier::Displayed, probe.displayed),
    ];
    let chosen = tiers
        .into_iter()
        .find_map(|(tier, region)| region.filter(Region::is_positive).map(|r| (tier, r)));
    let traversal = probe.traversal.filter(Region::is_positive);

    let (tier, region) = match (chosen, traversal) {
        (Some((tier, region)), Some(walk)) if extends_past(&walk, &region) => {
            debug!(tier:?; "Traversal bounds exceed chosen tier");
            (BoundsTier::Traversal, region.union(&walk))
        }
        (Some(found), _) => found,
        (None, Some(walk)) => (BoundsTier::Traversal, walk),
        (None, None) => return None,
    };

    let size = clamp_size(region.size(), options);
    debug!(
        tier:?,
        width = size.width,
        height = size.height;
        "Resolved export bounds"
    );
    Some(ResolvedBounds { region, size, tier })
}

/// Whether `walk` reaches beyond any edge of `region`.
fn extends_past(walk: &Region, region: &Region) -> bool {
    const SLACK: f32 = 1e-3;
    walk.x < region.x - SLACK
        || walk.y < region.y - SLACK
        || walk.right() > region.right() + SLACK
        || walk.bottom() > region.bottom() + SLACK
}

/// Downscale proportionally to the per-side maximum, then raise to the minimums.
///
/// A non-positive maximum means no cap, and minimums above the cap are lowered to it.
fn clamp_size(size: Size, options: &ExportOptions) -> Size {
    let max_side = if options.max_side > 0.0 {
        options.max_side
    } else {
        f32::MAX
    };
    let min_width = options.min_width.max(0.0).min(max_side);
    let min_height = options.min_height.max(0.0).min(max_side);

    let longest = size.width.max(size.height);
    let factor = if longest > max_side {
        max_side / longest
    } else {
        1.0
    };

    Size::new(
        (size.width * factor).clamp(min_width, max_side),
        (size.height * factor).clamp(min_height, max_side),
    )
}
