pub mod bounds;
pub mod html;
pub mod pdf;
pub mod raster;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::ContentKind;
use crate::surface::VectorImage;
use crate::theme::{ColorScheme, Palette};

use bounds::{SurfaceProbe, resolve_bounds};
use raster::{Backdrop, RasterPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    #[value(alias = "jpg")]
    Jpeg,
    Pdf,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Html => "html",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Html => "text/html;charset=utf-8",
        }
    }

    /// Formats a host should offer for content of `kind`.
    pub fn offered(kind: ContentKind) -> &'static [ExportFormat] {
        match kind {
            ContentKind::Diagram => &[ExportFormat::Png, ExportFormat::Jpeg, ExportFormat::Pdf],
            ContentKind::RichText => &[ExportFormat::Html],
            ContentKind::Unknown => &[],
        }
    }

    /// `Ok` when this format is offered for `kind`.
    pub fn ensure_offered(self, kind: ContentKind) -> Result<(), ExportError> {
        if Self::offered(kind).contains(&self) {
            Ok(())
        } else {
            Err(ExportError::Unsupported { format: self, kind })
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ExportFormat::Png => "PNG",
            ExportFormat::Jpeg => "JPEG",
            ExportFormat::Pdf => "PDF",
            ExportFormat::Html => "HTML",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub color_scheme: ColorScheme,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub suggested_filename: String,
    pub mime_type: &'static str,
}

/// What is being exported.
#[derive(Debug, Clone, Copy)]
pub enum ExportSource<'a> {
    Diagram(&'a VectorImage),
    RichText(&'a str),
}

impl ExportSource<'_> {
    pub fn kind(&self) -> ContentKind {
        match self {
            ExportSource::Diagram(_) => ContentKind::Diagram,
            ExportSource::RichText(_) => ContentKind::RichText,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("no content to export")]
    NoContent,
    #[error("{format} export is not available for {kind} content")]
    Unsupported {
        format: ExportFormat,
        kind: ContentKind,
    },
    #[error("{encoder} encoder failed: {message}")]
    Encoder {
        encoder: &'static str,
        message: String,
    },
}

impl ExportError {
    pub(crate) fn encoder(encoder: &'static str, message: impl Into<String>) -> Self {
        ExportError::Encoder {
            encoder,
            message: message.into(),
        }
    }
}

fn default_supersample() -> f32 {
    2.0
}

fn default_padding() -> f32 {
    20.0
}

fn default_min_width() -> f32 {
    400.0
}

fn default_min_height() -> f32 {
    300.0
}

fn default_max_side() -> f32 {
    4000.0
}

fn default_jpeg_quality() -> u8 {
    92
}

fn default_pdf_margin() -> f32 {
    20.0
}

fn default_filename_prefix() -> String {
    "mermaid".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    #[serde(default = "default_supersample")]
    pub supersample: f32,
    #[serde(default = "default_padding")]
    pub padding: f32,
    #[serde(default = "default_min_width")]
    pub min_width: f32,
    #[serde(default = "default_min_height")]
    pub min_height: f32,
    #[serde(default = "default_max_side")]
    pub max_side: f32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_pdf_margin")]
    pub pdf_margin: f32,
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            supersample: default_supersample(),
            padding: default_padding(),
            min_width: default_min_width(),
            min_height: default_min_height(),
            max_side: default_max_side(),
            jpeg_quality: default_jpeg_quality(),
            pdf_margin: default_pdf_margin(),
            filename_prefix: default_filename_prefix(),
        }
    }
}

/// `{prefix}-{UTC timestamp}.{ext}`, with the timestamp safe for file systems.
pub fn suggested_filename(prefix: &str, format: ExportFormat, at: DateTime<Utc>) -> String {
    format!(
        "{}-{}.{}",
        prefix,
        at.format("%Y-%m-%dT%H-%M-%S-%3fZ"),
        format.extension()
    )
}

fn backdrop_for(format: ExportFormat, scheme: ColorScheme) -> Backdrop {
    match (scheme, format) {
        (ColorScheme::Light, ExportFormat::Png) => Backdrop::Transparent,
        _ => Backdrop::Solid(Palette::for_scheme(scheme).backdrop_rgb()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Exporter {
    options: ExportOptions,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn export(
        &self,
        source: ExportSource<'_>,
        request: ExportRequest,
    ) -> Result<ExportArtifact, ExportError> {
        let bytes = match (request.format, source) {
            (ExportFormat::Html, ExportSource::RichText(text)) => {
                html::render_document(text, request.color_scheme, &self.options.filename_prefix)
                    .into_bytes()
            }
            (ExportFormat::Html, ExportSource::Diagram(_))
            | (_, ExportSource::RichText(_)) => {
                return Err(ExportError::Unsupported {
                    format: request.format,
                    kind: source.kind(),
                });
            }
            (format, ExportSource::Diagram(image)) => {
                self.export_raster(image, format, request.color_scheme)?
            }
        };

        let artifact = ExportArtifact {
            suggested_filename: suggested_filename(
                &self.options.filename_prefix,
                request.format,
                Utc::now(),
            ),
            mime_type: request.format.mime_type(),
            bytes,
        };
        info!(
            format:% = request.format,
            scheme:% = request.color_scheme,
            bytes = artifact.bytes.len(),
            filename:% = artifact.suggested_filename;
            "Exported"
        );
        Ok(artifact)
    }

    fn export_raster(
        &self,
        image: &VectorImage,
        format: ExportFormat,
        scheme: ColorScheme,
    ) -> Result<Vec<u8>, ExportError> {
        let tree = image
            .tree()
            .map_err(|e| ExportError::encoder("SVG", e))?;
        let probe = SurfaceProbe::of(image.svg(), &tree);
        let bounds = resolve_bounds(&probe, &self.options).ok_or(ExportError::NoContent)?;

        let invert = scheme.is_dark() && !image.has_native_variant(scheme);
        debug!(invert, tier:? = bounds.tier; "Materializing surface");
        let plan = RasterPlan {
            supersample: self.options.supersample,
            padding: self.options.padding,
            backdrop: backdrop_for(format, scheme),
            invert,
        };
        let canvas = raster::paint(&tree, &bounds, &plan)?;

        match format {
            ExportFormat::Png => raster::encode_png(&canvas),
            ExportFormat::Jpeg => raster::encode_jpeg(&canvas, self.options.jpeg_quality),
            ExportFormat::Pdf => {
                let png = raster::encode_png(&canvas)?;
                pdf::encode_pdf(
                    &png,
                    self.options.supersample,
                    self.options.pdf_margin,
                    &Palette::for_scheme(scheme).backdrop_color,
                )
            }
            ExportFormat::Html => Err(ExportError::Unsupported {
                format,
                kind: ContentKind::Diagram,
            }),
        }
    }
}
