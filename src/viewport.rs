use log::trace;
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Size};

fn default_min_scale() -> f32 {
    0.1
}

fn default_max_scale() -> f32 {
    10.0
}

fn default_zoom_in_step() -> f32 {
    1.1
}

fn default_zoom_out_step() -> f32 {
    0.9
}

fn default_fit_margin() -> f32 {
    20.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportConfig {
    #[serde(default = "default_min_scale")]
    pub min_scale: f32,
    #[serde(default = "default_max_scale")]
    pub max_scale: f32,
    #[serde(default = "default_zoom_in_step")]
    pub zoom_in_step: f32,
    #[serde(default = "default_zoom_out_step")]
    pub zoom_out_step: f32,
    /// Space kept free on every side of the container by auto-fit.
    #[serde(default = "default_fit_margin")]
    pub fit_margin: f32,
    /// Let auto-fit enlarge content beyond its natural size.
    #[serde(default)]
    pub allow_upscale: bool,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            zoom_in_step: default_zoom_in_step(),
            zoom_out_step: default_zoom_out_step(),
            fit_margin: default_fit_margin(),
            allow_upscale: false,
        }
    }
}

impl ViewportConfig {
    /// Usable `[min, max]` scale range. A non-positive minimum falls back to the default and a
    /// maximum below the minimum collapses onto it, so the range is never empty or zero.
    pub fn scale_range(&self) -> (f32, f32) {
        let min = if self.min_scale.is_finite() && self.min_scale > 0.0 {
            self.min_scale
        } else {
            default_min_scale()
        };
        let max = if self.max_scale.is_finite() && self.max_scale >= min {
            self.max_scale
        } else {
            min
        };
        (min, max)
    }

    pub fn clamp(&self, scale: f32) -> f32 {
        let (min, max) = self.scale_range();
        if scale.is_nan() {
            return min;
        }
        scale.clamp(min, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportState {
    pub scale: f32,
    pub offset: Point,
    pub dragging: bool,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: Point::default(),
            dragging: false,
        }
    }
}

/// Pan and zoom for one displayed surface, mapping `screen = offset + content * scale`.
///
/// Created for each new surface and dropped when the surface changes.
#[derive(Debug, Clone)]
pub struct Viewport {
    config: ViewportConfig,
    natural: Size,
    container: Size,
    state: ViewportState,
    drag_start: Option<Point>,
}

impl Viewport {
    /// Viewport for a fresh surface, already auto-fitted.
    pub fn new(config: ViewportConfig, natural: Size, container: Size) -> Self {
        let mut viewport = Self {
            config,
            natural,
            container,
            state: ViewportState::default(),
            drag_start: None,
        };
        viewport.fit();
        viewport
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn natural_size(&self) -> Size {
        self.natural
    }

    pub fn container(&self) -> Size {
        self.container
    }

    /// Scale and center the content inside the container. Replaces scale and offset together.
    pub fn fit(&mut self) {
        let margin = self.config.fit_margin * 2.0;
        let avail_w = (self.container.width - margin).max(0.0);
        let avail_h = (self.container.height - margin).max(0.0);

        let mut scale = if self.natural.is_positive() {
            (avail_w / self.natural.width).min(avail_h / self.natural.height)
        } else {
            1.0
        };
        if !self.config.allow_upscale {
            scale = scale.min(1.0);
        }
        let scale = self.config.clamp(scale);

        let offset = Point::new(
            (self.container.width - self.natural.width * scale) / 2.0,
            (self.container.height - self.natural.height * scale) / 2.0,
        );

        trace!(scale, x = offset.x, y = offset.y; "Auto-fit");
        self.state = ViewportState {
            scale,
            offset,
            dragging: self.state.dragging,
        };
    }

    pub fn reset(&mut self) {
        self.fit();
    }

    pub fn double_click(&mut self) {
        self.fit();
    }

    pub fn resize(&mut self, container: Size) {
        self.container = container;
        self.fit();
    }

    /// Wheel zoom keeping the content point under `cursor` fixed on screen.
    pub fn wheel(&mut self, delta_y: f32, cursor: Point) {
        let step = if delta_y > 0.0 {
            self.config.zoom_out_step
        } else {
            self.config.zoom_in_step
        };
        let old = self.state.scale;
        let new = self.config.clamp(old * step);
        let ratio = new / old;

        let rel = cursor.sub(self.state.offset);
        self.state.offset = Point::new(
            self.state.offset.x - rel.x * (ratio - 1.0),
            self.state.offset.y - rel.y * (ratio - 1.0),
        );
        self.state.scale = new;

        if self.state.dragging {
            // Keep the grabbed point under the pointer.
            self.drag_start = Some(cursor.sub(self.state.offset));
        }
    }

    pub fn zoom_in(&mut self) {
        self.button_zoom(self.config.zoom_in_step);
    }

    pub fn zoom_out(&mut self) {
        self.button_zoom(self.config.zoom_out_step);
    }

    fn button_zoom(&mut self, step: f32) {
        self.state.scale = self.config.clamp(self.state.scale * step);
        self.state.offset = Point::default();
    }

    pub fn press(&mut self, pointer: Point) {
        self.drag_start = Some(pointer.sub(self.state.offset));
        self.state.dragging = true;
    }

    pub fn drag_to(&mut self, pointer: Point) {
        if let Some(start) = self.drag_start {
            self.state.offset = pointer.sub(start);
        }
    }

    pub fn release(&mut self) {
        self.drag_start = None;
        self.state.dragging = false;
    }

    pub fn to_screen(&self, content: Point) -> Point {
        Point::new(
            self.state.offset.x + content.x * self.state.scale,
            self.state.offset.y + content.y * self.state.scale,
        )
    }

    pub fn to_content(&self, screen: Point) -> Point {
        let rel = screen.sub(self.state.offset);
        Point::new(rel.x / self.state.scale, rel.y / self.state.scale)
    }

    /// CSS/SVG transform string for the current state.
    pub fn transform(&self) -> String {
        format!(
            "translate({}px, {}px) scale({})",
            self.state.offset.x, self.state.offset.y, self.state.scale
        )
    }

    pub fn zoom_percent(&self) -> u32 {
        (self.state.scale * 100.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;

    fn viewport(natural: Size, container: Size) -> Viewport {
        Viewport::new(ViewportConfig::default(), natural, container)
    }

    #[test]
    fn fit_never_upscales_small_content() {
        let v = viewport(Size::new(100.0, 50.0), Size::new(800.0, 600.0));
        let state = v.state();
        assert_eq!(state.scale, 1.0);
        assert_eq!(state.offset, Point::new(350.0, 275.0));
    }

    #[test]
    fn fit_shrinks_large_content_into_margin() {
        let v = viewport(Size::new(1520.0, 200.0), Size::new(800.0, 600.0));
        assert!(approx_eq!(f32, v.state().scale, 0.5, epsilon = 1e-6));
        assert!(approx_eq!(f32, v.state().offset.x, 20.0, epsilon = 1e-4));
    }

    #[test]
    fn upscale_allowed_by_config() {
        let config = ViewportConfig {
            allow_upscale: true,
            ..ViewportConfig::default()
        };
        let v = Viewport::new(config, Size::new(100.0, 100.0), Size::new(440.0, 440.0));
        assert!(approx_eq!(f32, v.state().scale, 4.0, epsilon = 1e-6));
    }

    #[test]
    fn zero_natural_size_uses_unit_scale() {
        let v = viewport(Size::new(0.0, 0.0), Size::new(800.0, 600.0));
        assert_eq!(v.state().scale, 1.0);
    }

    #[test]
    fn wheel_anchors_cursor() {
        let mut v = viewport(Size::new(200.0, 100.0), Size::new(800.0, 600.0));
        let cursor = Point::new(420.0, 310.0);
        let before = v.to_content(cursor);

        v.wheel(-1.0, cursor);
        assert!(approx_eq!(f32, v.state().scale, 1.1, epsilon = 1e-6));

        let after = v.to_content(cursor);
        assert!(approx_eq!(f32, before.x, after.x, epsilon = 1e-3));
        assert!(approx_eq!(f32, before.y, after.y, epsilon = 1e-3));
    }

    #[test]
    fn wheel_down_zooms_out() {
        let mut v = viewport(Size::new(200.0, 100.0), Size::new(800.0, 600.0));
        v.wheel(3.0, Point::new(0.0, 0.0));
        assert!(approx_eq!(f32, v.state().scale, 0.9, epsilon = 1e-6));
    }

    #[test]
    fn buttons_zoom_and_reset_offset() {
        let mut v = viewport(Size::new(200.0, 100.0), Size::new(800.0, 600.0));
        v.zoom_in();
        assert!(approx_eq!(f32, v.state().scale, 1.1, epsilon = 1e-6));
        assert_eq!(v.state().offset, Point::default());
        v.zoom_out();
        assert!(approx_eq!(f32, v.state().scale, 0.99, epsilon = 1e-6));
        assert_eq!(v.zoom_percent(), 99);
    }

    #[test]
    fn drag_moves_offset_without_snapping() {
        let mut v = viewport(Size::new(200.0, 100.0), Size::new(800.0, 600.0));
        let start = v.state().offset;
        v.press(Point::new(10.0, 10.0));
        assert!(v.state().dragging);
        v.drag_to(Point::new(40.0, 25.0));
        v.release();

        let state = v.state();
        assert!(!state.dragging);
        assert_eq!(state.offset, Point::new(start.x + 30.0, start.y + 15.0));

        // Moves after release are ignored.
        v.drag_to(Point::new(500.0, 500.0));
        assert_eq!(v.state().offset, state.offset);
    }

    #[test]
    fn reset_restores_fit_after_gestures() {
        let mut v = viewport(Size::new(200.0, 100.0), Size::new(800.0, 600.0));
        let fitted = v.state();
        v.zoom_in();
        v.wheel(-1.0, Point::new(5.0, 5.0));
        v.reset();
        assert_eq!(v.state(), fitted);
        v.zoom_in();
        v.double_click();
        assert_eq!(v.state(), fitted);
    }

    #[test]
    fn resize_refits() {
        let mut v = viewport(Size::new(1000.0, 1000.0), Size::new(1040.0, 1040.0));
        assert_eq!(v.state().scale, 1.0);
        v.resize(Size::new(540.0, 540.0));
        assert!(approx_eq!(f32, v.state().scale, 0.5, epsilon = 1e-6));
    }

    #[test]
    fn transform_string() {
        let v = viewport(Size::new(200.0, 100.0), Size::new(800.0, 600.0));
        assert_eq!(v.transform(), "translate(300px, 250px) scale(1)");
    }

    #[test]
    fn inverted_config_does_not_panic() {
        let config = ViewportConfig {
            min_scale: 5.0,
            max_scale: 1.0,
            ..ViewportConfig::default()
        };
        let mut v = Viewport::new(config, Size::new(200.0, 100.0), Size::new(800.0, 600.0));
        assert_eq!(v.state().scale, 5.0);
        v.wheel(1.0, Point::new(10.0, 10.0));
        v.zoom_in();
        assert_eq!(v.state().scale, 5.0);
    }

    #[test]
    fn zero_min_scale_keeps_scale_positive() {
        let config = ViewportConfig {
            min_scale: 0.0,
            zoom_out_step: 0.0,
            ..ViewportConfig::default()
        };
        let mut v = Viewport::new(config, Size::new(200.0, 100.0), Size::new(0.0, 0.0));
        assert!(v.state().scale > 0.0);

        v.wheel(1.0, Point::new(10.0, 10.0));
        let state = v.state();
        assert!(state.scale > 0.0);
        assert!(state.offset.x.is_finite() && state.offset.y.is_finite());
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::super::*;

        fn valid_config() -> impl Strategy<Value = ViewportConfig> {
            (
                0.01f32..5.0,
                1.0f32..20.0,
                1.01f32..3.0,
                0.1f32..0.99,
                0.0f32..100.0,
                any::<bool>(),
            )
                .prop_map(|(min, span, zoom_in, zoom_out, margin, upscale)| ViewportConfig {
                    min_scale: min,
                    max_scale: min * span,
                    zoom_in_step: zoom_in,
                    zoom_out_step: zoom_out,
                    fit_margin: margin,
                    allow_upscale: upscale,
                })
        }

        proptest! {
            #[test]
            fn zoom_stays_within_limits(
                deltas in prop::collection::vec(-1.0e6f32..1.0e6, 1..200),
                x in -5000.0f32..5000.0,
                y in -5000.0f32..5000.0,
            ) {
                let config = ViewportConfig::default();
                let mut v = Viewport::new(config, Size::new(300.0, 200.0), Size::new(800.0, 600.0));
                for delta in deltas {
                    v.wheel(delta, Point::new(x, y));
                    let scale = v.state().scale;
                    prop_assert!(scale >= config.min_scale && scale <= config.max_scale);
                }
                for _ in 0..100 {
                    v.zoom_in();
                }
                prop_assert!(v.state().scale <= config.max_scale);
            }

            #[test]
            fn any_valid_config_keeps_scale_in_range(
                config in valid_config(),
                nw in 0.0f32..5_000.0,
                nh in 0.0f32..5_000.0,
                cw in 0.0f32..3_000.0,
                ch in 0.0f32..3_000.0,
                deltas in prop::collection::vec(-500.0f32..500.0, 0..50),
            ) {
                let mut v = Viewport::new(config, Size::new(nw, nh), Size::new(cw, ch));
                let in_range = |s: f32| s > 0.0 && s >= config.min_scale && s <= config.max_scale;
                prop_assert!(in_range(v.state().scale));
                for delta in deltas {
                    v.wheel(delta, Point::new(cw / 2.0, ch / 2.0));
                    let state = v.state();
                    prop_assert!(in_range(state.scale));
                    prop_assert!(state.offset.x.is_finite() && state.offset.y.is_finite());
                }
                v.zoom_out();
                prop_assert!(in_range(v.state().scale));
            }

            #[test]
            fn fit_is_idempotent(
                nw in 0.0f32..10_000.0,
                nh in 0.0f32..10_000.0,
                cw in 0.0f32..4_000.0,
                ch in 0.0f32..4_000.0,
            ) {
                let mut v = Viewport::new(
                    ViewportConfig::default(),
                    Size::new(nw, nh),
                    Size::new(cw, ch),
                );
                let first = v.state();
                v.fit();
                prop_assert_eq!(first, v.state());
                prop_assert!(first.scale > 0.0 && first.scale <= 1.0);
            }
        }
    }
}
