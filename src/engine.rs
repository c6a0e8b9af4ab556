use std::path::PathBuf;
use std::process::{Command, Stdio};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::theme::ColorScheme;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub color_scheme: ColorScheme,
}

/// A clickable element discovered in a rendered surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkBinding {
    pub element_id: Option<String>,
    pub href: String,
}

/// Interaction hooks a host may attach to a displayed surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InteractionHooks {
    pub links: Vec<LinkBinding>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub svg: String,
    pub bindings: Option<InteractionHooks>,
    /// The engine applied the requested color scheme itself.
    pub themed: bool,
}

/// Opaque engine failure; only the message is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait RenderEngine {
    fn name(&self) -> &'static str;

    fn render(
        &self,
        id: &str,
        source: &str,
        options: &RenderOptions,
    ) -> Result<EngineOutput, EngineError>;
}

impl<E: RenderEngine + ?Sized> RenderEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn render(
        &self,
        id: &str,
        source: &str,
        options: &RenderOptions,
    ) -> Result<EngineOutput, EngineError> {
        (**self).render(id, source, options)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Native renderer when compiled in, otherwise the external command.
    #[default]
    Auto,
    Native,
    Command,
}

/// Pure Rust Mermaid renderer.
#[cfg(feature = "mermaid")]
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

#[cfg(feature = "mermaid")]
impl NativeEngine {
    fn theme(scheme: ColorScheme) -> mermaid_rs_renderer::Theme {
        let modern = mermaid_rs_renderer::Theme::modern();
        match scheme {
            ColorScheme::Light => modern,
            ColorScheme::Dark => mermaid_rs_renderer::Theme {
                background: "#1a1a1a".to_string(),
                text_color: "#e6edf3".to_string(),
                primary_color: "#1f6feb".to_string(),
                primary_text_color: "#ffffff".to_string(),
                primary_border_color: "#8b949e".to_string(),
                line_color: "#c9d1d9".to_string(),
                edge_label_background: "#161b22".to_string(),
                cluster_background: "#161b22".to_string(),
                cluster_border: "#30363d".to_string(),
                ..modern
            },
        }
    }
}

#[cfg(feature = "mermaid")]
impl RenderEngine for NativeEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    fn render(
        &self,
        id: &str,
        source: &str,
        options: &RenderOptions,
    ) -> Result<EngineOutput, EngineError> {
        debug!(id, scheme:% = options.color_scheme; "Rendering with native engine");
        let opts = mermaid_rs_renderer::RenderOptions {
            theme: Self::theme(options.color_scheme),
            layout: mermaid_rs_renderer::LayoutConfig::default(),
        };

        let svg = mermaid_rs_renderer::render_with_options(source, opts)
            .map_err(|e| EngineError::new(e.to_string()))?;

        Ok(EngineOutput {
            svg,
            bindings: None,
            themed: true,
        })
    }
}

/// Drives an external CLI such as `mmdc` through scratch files.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }
}

impl RenderEngine for CommandEngine {
    fn name(&self) -> &'static str {
        "command"
    }

    fn render(
        &self,
        id: &str,
        source: &str,
        options: &RenderOptions,
    ) -> Result<EngineOutput, EngineError> {
        // The directory and everything in it is removed when `scratch` drops.
        let scratch = tempfile::Builder::new()
            .prefix("markie-live-")
            .tempdir()
            .map_err(|e| EngineError::new(format!("Failed to create scratch directory: {}", e)))?;
        let input_path = scratch.path().join(format!("{id}.mmd"));
        let output_path = scratch.path().join(format!("{id}.svg"));

        std::fs::write(&input_path, source)
            .map_err(|e| EngineError::new(format!("Failed to write diagram source: {}", e)))?;

        debug!(id, program:? = self.program; "Rendering with external command");
        let output = Command::new(&self.program)
            .arg("-i")
            .arg(&input_path)
            .arg("-o")
            .arg(&output_path)
            .args(["-t", options.color_scheme.engine_theme()])
            .args(["-b", "transparent", "-q"])
            .args(&self.extra_args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                EngineError::new(format!(
                    "Failed to launch {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.program.display(), output.status)
            } else {
                stderr
            };
            return Err(EngineError::new(message));
        }

        let svg = std::fs::read_to_string(&output_path)
            .map_err(|e| EngineError::new(format!("Failed to read rendered SVG: {}", e)))?;

        Ok(EngineOutput {
            svg,
            bindings: None,
            themed: true,
        })
    }
}

/// Build the engine selected by `kind`.
pub fn build_engine(
    kind: EngineKind,
    command: &str,
    command_args: &[String],
) -> Result<Box<dyn RenderEngine + Send + Sync>, String> {
    let command_engine = || -> Box<dyn RenderEngine + Send + Sync> {
        Box::new(CommandEngine::new(command, command_args.to_vec()))
    };

    match kind {
        EngineKind::Command => Ok(command_engine()),
        #[cfg(feature = "mermaid")]
        EngineKind::Native | EngineKind::Auto => Ok(Box::new(NativeEngine)),
        #[cfg(not(feature = "mermaid"))]
        EngineKind::Native => {
            Err("Native engine not compiled in (enable the `mermaid` feature)".to_string())
        }
        #[cfg(not(feature = "mermaid"))]
        EngineKind::Auto => Ok(command_engine()),
    }
}
