use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::classify::{ContentKind, classify};
use crate::diagnostic::Diagnostic;
use crate::engine::{RenderEngine, RenderOptions};
use crate::geometry::Size;
use crate::render::{RenderAdapter, RenderFailure, Rendered};
use crate::repair::{ChatProvider, RepairError, Repairer};
use crate::viewport::{Viewport, ViewportConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn sequence(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct Sequencer {
    issued: AtomicU64,
}

impl Sequencer {
    fn issue(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket.0
    }
}

/// What happened to a committed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Applied,
    /// A newer request was issued; the result was dropped.
    Stale,
}

struct DocumentState {
    text: String,
    kind: ContentKind,
    rendered: Option<Rendered>,
    failure: Option<RenderFailure>,
    diagnostic: Option<Diagnostic>,
    viewport: Option<Viewport>,
    container: Size,
}

/// Per-document state: source text, last good surface, latest diagnostic and the live viewport.
///
/// Rendering and repair run outside the state lock. Each attempt takes a [`Ticket`] first and
/// commits afterwards; only the newest ticket of its kind may commit.
pub struct Session {
    viewport_config: ViewportConfig,
    state: Mutex<DocumentState>,
    renders: Sequencer,
    repairs: Sequencer,
}

impl Session {
    pub fn new(viewport_config: ViewportConfig, container: Size) -> Self {
        Self {
            viewport_config,
            state: Mutex::new(DocumentState {
                text: String::new(),
                kind: ContentKind::Unknown,
                rendered: None,
                failure: None,
                diagnostic: None,
                viewport: None,
                container,
            }),
            renders: Sequencer::default(),
            repairs: Sequencer::default(),
        }
    }

    /// Replace the source text and reclassify it.
    pub fn update(&self, text: &str) -> ContentKind {
        let kind = classify(text);
        let mut state = self.state.lock();
        state.text = text.to_string();
        state.kind = kind;
        debug!(kind:% = kind, bytes = text.len(); "Source updated");
        kind
    }

    pub fn text(&self) -> String {
        self.state.lock().text.clone()
    }

    pub fn kind(&self) -> ContentKind {
        self.state.lock().kind
    }

    pub fn rendered(&self) -> Option<Rendered> {
        self.state.lock().rendered.clone()
    }

    pub fn failure(&self) -> Option<RenderFailure> {
        self.state.lock().failure.clone()
    }

    pub fn diagnostic(&self) -> Option<Diagnostic> {
        self.state.lock().diagnostic.clone()
    }

    pub fn begin_render(&self) -> Ticket {
        self.renders.issue()
    }

    /// Record a render outcome. Success replaces the surface and starts a fresh viewport;
    /// failure keeps the last good surface and supersedes the diagnostic.
    pub fn commit_render(&self, ticket: Ticket, result: Result<Rendered, RenderFailure>) -> Commit {
        if !self.renders.is_current(ticket) {
            warn!(ticket = ticket.0; "Discarding stale render result");
            return Commit::Stale;
        }

        let mut state = self.state.lock();
        match result {
            Ok(rendered) => {
                let natural = rendered.surface.natural_size();
                let container = state.container;
                state.viewport = Some(Viewport::new(self.viewport_config, natural, container));
                state.rendered = Some(rendered);
                state.failure = None;
                state.diagnostic = None;
            }
            Err(failure) => {
                state.diagnostic = Some(failure.diagnostic());
                state.failure = Some(failure);
            }
        }
        Commit::Applied
    }

    /// Render the current text through `adapter` and commit the result.
    pub fn render<E: RenderEngine>(
        &self,
        adapter: &RenderAdapter<E>,
        options: &RenderOptions,
    ) -> (Commit, Result<Rendered, RenderFailure>) {
        let ticket = self.begin_render();
        let text = self.text();
        let id = format!("preview-{}", ticket.0);

        let result = adapter.render(&id, &text, options);
        let commit = self.commit_render(ticket, result.clone());
        (commit, result)
    }

    pub fn begin_repair(&self) -> Ticket {
        self.repairs.issue()
    }

    /// Install corrected source from a repair. The caller re-renders afterwards.
    pub fn commit_repair(&self, ticket: Ticket, corrected: &str) -> Commit {
        if !self.repairs.is_current(ticket) {
            warn!(ticket = ticket.0; "Discarding stale repair result");
            return Commit::Stale;
        }
        self.update(corrected);
        Commit::Applied
    }

    /// Ask `provider` to fix the current text against the latest diagnostic.
    pub fn repair(
        &self,
        repairer: &Repairer,
        provider: &dyn ChatProvider,
    ) -> Result<(Commit, String), RepairError> {
        let (text, diagnostic) = {
            let state = self.state.lock();
            (state.text.clone(), state.diagnostic.clone())
        };
        let diagnostic = diagnostic.ok_or(RepairError::NothingToRepair)?;

        let ticket = self.begin_repair();
        let corrected = repairer.repair(&text, &diagnostic, provider)?;
        Ok((self.commit_repair(ticket, &corrected), corrected))
    }

    /// Run `f` against the live viewport, if a surface is displayed.
    pub fn with_viewport<T>(&self, f: impl FnOnce(&mut Viewport) -> T) -> Option<T> {
        self.state.lock().viewport.as_mut().map(f)
    }

    pub fn resize(&self, container: Size) {
        let mut state = self.state.lock();
        state.container = container;
        if let Some(viewport) = state.viewport.as_mut() {
            viewport.resize(container);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Locale;
    use crate::geometry::Point;
    use crate::surface::VectorImage;

    fn rendered(width: u32) -> Rendered {
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="100"><rect width="10" height="10"/></svg>"#
        );
        Rendered {
            surface: VectorImage::from_svg(svg, None).unwrap(),
            bindings: None,
        }
    }

    fn session() -> Session {
        Session::new(ViewportConfig::default(), Size::new(800.0, 600.0))
    }

    #[test]
    fn update_reclassifies() {
        let s = session();
        assert_eq!(s.update("graph TD\nA-->B"), ContentKind::Diagram);
        assert_eq!(s.update("# Title"), ContentKind::RichText);
        assert_eq!(s.kind(), ContentKind::RichText);
    }

    #[test]
    fn only_latest_render_commits() {
        let s = session();
        let old = s.begin_render();
        let new = s.begin_render();

        assert_eq!(s.commit_render(old, Ok(rendered(300))), Commit::Stale);
        assert!(s.rendered().is_none());
        assert_eq!(s.commit_render(new, Ok(rendered(200))), Commit::Applied);
        assert_eq!(s.rendered().unwrap().surface.natural_size().width, 200.0);
    }

    #[test]
    fn failure_keeps_last_good_surface() {
        let s = session();
        let t = s.begin_render();
        s.commit_render(t, Ok(rendered(200)));

        let t = s.begin_render();
        let failure = RenderFailure::new("Parse error on line 1:", Locale::En);
        s.commit_render(t, Err(failure));

        assert!(s.rendered().is_some());
        assert_eq!(s.diagnostic().unwrap().line, Some(1));

        let t = s.begin_render();
        s.commit_render(t, Ok(rendered(200)));
        assert!(s.diagnostic().is_none());
    }

    #[test]
    fn new_surface_gets_fresh_viewport() {
        let s = session();
        let t = s.begin_render();
        s.commit_render(t, Ok(rendered(200)));
        s.with_viewport(|v| v.wheel(-1.0, Point::new(10.0, 10.0)));
        assert!(s.with_viewport(|v| v.state().scale).unwrap() > 1.0);

        let t = s.begin_render();
        s.commit_render(t, Ok(rendered(300)));
        assert_eq!(s.with_viewport(|v| v.state().scale), Some(1.0));
    }

    #[test]
    fn resize_refits_live_viewport() {
        let s = session();
        assert_eq!(s.with_viewport(|v| v.state()), None);
        let t = s.begin_render();
        s.commit_render(t, Ok(rendered(400)));
        s.resize(Size::new(240.0, 600.0));
        assert_eq!(s.with_viewport(|v| v.state().scale), Some(0.5));
    }

    #[test]
    fn stale_repair_is_dropped() {
        let s = session();
        s.update("graph TD\nA-->");
        let old = s.begin_repair();
        let new = s.begin_repair();
        assert_eq!(s.commit_repair(old, "graph TD\nA-->C"), Commit::Stale);
        assert_eq!(s.commit_repair(new, "graph TD\nA-->B"), Commit::Applied);
        assert_eq!(s.text(), "graph TD\nA-->B");
    }

    #[test]
    fn repair_without_diagnostic_is_refused() {
        struct Never;
        impl ChatProvider for Never {
            fn kind(&self) -> crate::repair::ProviderKind {
                crate::repair::ProviderKind::Kimi
            }
            fn chat(
                &self,
                _messages: &[crate::repair::ChatMessage],
            ) -> Result<crate::repair::ChatMessage, crate::repair::ProviderError> {
                unreachable!("no request expected")
            }
        }

        let s = session();
        s.update("graph TD\nA-->B");
        assert_eq!(
            s.repair(&Repairer::default(), &Never),
            Err(RepairError::NothingToRepair)
        );
    }
}
