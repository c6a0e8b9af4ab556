use std::num::NonZeroUsize;
use std::sync::LazyLock;

use log::{debug, info, warn};
use lru::LruCache;
use parking_lot::Mutex;
use quick_xml::events::Event as XmlEvent;
use quick_xml::reader::Reader as XmlReader;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::diagnostic::{self, Catalog, Diagnostic, Locale, fill};
use crate::engine::{InteractionHooks, LinkBinding, RenderEngine, RenderOptions};
use crate::surface::VectorImage;
use crate::theme::ColorScheme;

/// A successfully rendered surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub surface: VectorImage,
    pub bindings: Option<InteractionHooks>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    Syntax,
    MissingDiagramType,
    Lexical,
    Expecting,
    Sequence,
    Class,
    Flowchart,
    Other,
}

/// Substring triggers, in precedence order.
const CATEGORY_RULES: &[(&[&str], FailureCategory)] = &[
    (&["Parse error"], FailureCategory::Syntax),
    (&["No diagram type detected"], FailureCategory::MissingDiagramType),
    (&["Lexical error"], FailureCategory::Lexical),
    (&["Expecting"], FailureCategory::Expecting),
    (&["sequenceDiagram"], FailureCategory::Sequence),
    (&["classDiagram"], FailureCategory::Class),
    (&["flowchart", "graph"], FailureCategory::Flowchart),
];

static EXPECTING_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Expecting (.+?),").expect("valid expecting regex"));

impl FailureCategory {
    pub fn of(message: &str) -> Self {
        CATEGORY_RULES
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| message.contains(n)))
            .map(|(_, category)| *category)
            .unwrap_or(FailureCategory::Other)
    }

    fn phrase(self, message: &str, catalog: &Catalog) -> String {
        match self {
            FailureCategory::Syntax => catalog.parse_error.to_string(),
            FailureCategory::MissingDiagramType => catalog.no_diagram_type.to_string(),
            FailureCategory::Lexical => catalog.lexical_error.to_string(),
            FailureCategory::Expecting => match EXPECTING_LIST.captures(message) {
                Some(caps) => fill(catalog.expected_syntax, &[("expected", &caps[1])]),
                None => catalog.expected_generic.to_string(),
            },
            FailureCategory::Sequence => catalog.sequence_error.to_string(),
            FailureCategory::Class => catalog.class_error.to_string(),
            FailureCategory::Flowchart => catalog.flowchart_error.to_string(),
            FailureCategory::Other => fill(catalog.render_error, &[("message", message)]),
        }
    }
}

/// The engine rejected the source. The raw message is always kept next to the friendly summary.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{summary}")]
pub struct RenderFailure {
    pub category: FailureCategory,
    pub summary: String,
    pub raw_message: String,
    #[serde(skip)]
    locale: Locale,
}

impl RenderFailure {
    pub fn new(raw_message: impl Into<String>, locale: Locale) -> Self {
        let raw_message = raw_message.into();
        let category = FailureCategory::of(&raw_message);
        let summary = category.phrase(&raw_message, locale.catalog());

        Self {
            category,
            summary,
            raw_message,
            locale,
        }
    }

    /// Structured breakdown of the raw message.
    pub fn diagnostic(&self) -> Diagnostic {
        diagnostic::parse_localized(&self.raw_message, self.locale)
    }
}

#[derive(Hash, PartialEq, Eq, Clone)]
struct CacheKey {
    scheme: ColorScheme,
    source: String,
}

pub struct RenderAdapter<E> {
    engine: E,
    locale: Locale,
    cache: Option<Mutex<LruCache<CacheKey, Rendered>>>,
}

impl<E: RenderEngine> RenderAdapter<E> {
    pub fn new(engine: E, locale: Locale, cache_capacity: usize) -> Self {
        Self {
            engine,
            locale,
            cache: NonZeroUsize::new(cache_capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn render(
        &self,
        id: &str,
        text: &str,
        options: &RenderOptions,
    ) -> Result<Rendered, RenderFailure> {
        let key = CacheKey {
            scheme: options.color_scheme,
            source: text.to_string(),
        };

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().get(&key) {
                debug!(id; "Render cache hit");
                return Ok(hit.clone());
            }
        }

        let output = self.engine.render(id, text, options).map_err(|e| {
            let failure = RenderFailure::new(e.message, self.locale);
            warn!(
                id,
                engine = self.engine.name(),
                category:? = failure.category;
                "Render failed: {}", failure.raw_message
            );
            failure
        })?;

        let native_scheme = output.themed.then_some(options.color_scheme);
        let bindings = output.bindings.or_else(|| scan_links(&output.svg));
        let surface = VectorImage::from_svg(output.svg, native_scheme)
            .map_err(|e| RenderFailure::new(e, self.locale))?;

        let natural = surface.natural_size();
        info!(
            id,
            engine = self.engine.name(),
            width = natural.width,
            height = natural.height;
            "Rendered diagram"
        );

        let rendered = Rendered { surface, bindings };
        if let Some(cache) = &self.cache {
            cache.lock().put(key, rendered.clone());
        }
        Ok(rendered)
    }
}

/// Collect `<a href>` elements from an SVG document.
fn scan_links(svg: &str) -> Option<InteractionHooks> {
    let mut reader = XmlReader::from_str(svg);
    let mut buf = Vec::new();
    let mut links = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(ref e)) | Ok(XmlEvent::Empty(ref e))
                if e.name().local_name().as_ref() == b"a" =>
            {
                let mut element_id = None;
                let mut href = None;
                for attr in e.attributes().filter_map(|a| a.ok()) {
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    match attr.key.local_name().as_ref() {
                        b"href" => href = Some(value),
                        b"id" => element_id = Some(value),
                        _ => {}
                    }
                }
                if let Some(href) = href {
                    links.push(LinkBinding { element_id, href });
                }
            }
            Ok(XmlEvent::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    (!links.is_empty()).then_some(InteractionHooks { links })
}
