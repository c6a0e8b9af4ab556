//! Live preview core for Mermaid diagrams and Markdown.
//!
//! Source text is classified, rendered through an external engine, displayed through a
//! pan/zoom [`viewport::Viewport`], and exported to PNG, JPEG, PDF or HTML. Render failures are
//! turned into structured [`diagnostic::Diagnostic`]s that can be handed to an AI provider for
//! repair.

pub mod classify;
pub mod config;
pub mod diagnostic;
pub mod engine;
pub mod error;
pub mod export;
pub mod fonts;
pub mod geometry;
pub mod render;
pub mod repair;
pub mod session;
pub mod surface;
pub mod theme;
pub mod viewport;
pub mod xml;

pub use classify::{ContentKind, classify};
pub use config::{AiConfig, Settings};
pub use diagnostic::{Diagnostic, ErrorDisplay, Locale, format_error_display, parse};
pub use engine::{EngineKind, RenderEngine, RenderOptions};
pub use error::{Error, Result};
pub use export::{ExportArtifact, ExportFormat, ExportRequest, ExportSource, Exporter};
pub use render::{RenderAdapter, RenderFailure, Rendered};
pub use repair::{ChatProvider, ProviderRegistry, Repairer};
pub use session::Session;
pub use surface::VectorImage;
pub use theme::ColorScheme;
pub use viewport::{Viewport, ViewportConfig, ViewportState};
