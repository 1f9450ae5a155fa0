//! Session state and the per-search pipeline.
//!
//! A [`SearchSession`] owns everything mutable: current tokens, result view,
//! selection, debounce state, and the render generation. It borrows the
//! read-only catalog and is meant to be driven from one event loop; nothing
//! here lives in ambient globals.

use crate::catalog::{Catalog, Entry};
use crate::dom::{self, Document, NodeId};
use crate::highlight::TokenPatterns;
use crate::render::{self, Typesetter};
use crate::search;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Keystroke debounce window.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub debounce_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_window: DEBOUNCE_WINDOW,
        }
    }
}

/// Trailing-edge debouncer, parameterized on the caller's clock so the
/// single-threaded model stays testable. A new submission within the window
/// cancels and reschedules the pending one; `ready` hands the query back
/// once the window has elapsed.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: Option<(Instant, String)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn submit(&mut self, query: &str, now: Instant) {
        self.pending = Some((now + self.window, query.to_string()));
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Deadline of the pending query, if any.
    pub fn ready_at(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    /// Takes the pending query once its window has elapsed.
    pub fn ready(&mut self, now: Instant) -> Option<String> {
        let due = matches!(&self.pending, Some((deadline, _)) if *deadline <= now);
        if due {
            self.pending.take().map(|(_, query)| query)
        } else {
            None
        }
    }
}

/// Identifies the render a typeset completion belongs to. A ticket captured
/// before an await stays valid only while no newer search has rendered;
/// stale completions must apply nothing.
#[derive(Debug, Clone)]
pub struct RenderTicket {
    shared: Arc<AtomicU64>,
    generation: u64,
}

impl RenderTicket {
    pub fn is_current(&self) -> bool {
        self.shared.load(Ordering::SeqCst) == self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct SearchSession<'a> {
    catalog: &'a Catalog,
    engine: Option<&'a dyn Typesetter>,
    debouncer: Debouncer,
    generation: Arc<AtomicU64>,
    tokens: Vec<String>,
    results: Vec<&'a Entry>,
    selection: Option<usize>,
}

impl<'a> SearchSession<'a> {
    pub fn new(catalog: &'a Catalog, engine: Option<&'a dyn Typesetter>) -> Self {
        Self::with_config(catalog, engine, SessionConfig::default())
    }

    pub fn with_config(
        catalog: &'a Catalog,
        engine: Option<&'a dyn Typesetter>,
        config: SessionConfig,
    ) -> Self {
        Self {
            catalog,
            engine,
            debouncer: Debouncer::new(config.debounce_window),
            generation: Arc::new(AtomicU64::new(0)),
            tokens: Vec::new(),
            results: catalog.entries().iter().collect(),
            selection: None,
        }
    }

    pub fn results(&self) -> &[&'a Entry] {
        &self.results
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn selection(&self) -> Option<usize> {
        self.selection
    }

    /// Debounced entry point for keystroke events. Only the last submission
    /// of a burst survives; `poll` fires it once the window has elapsed.
    pub fn queue_query(&mut self, query: &str, now: Instant) {
        self.debouncer.submit(query, now);
    }

    /// Runs a pending debounced query whose window has elapsed. Returns
    /// whether a search actually ran.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.debouncer.ready(now) {
            Some(query) => {
                self.search(&query);
                true
            }
            None => false,
        }
    }

    /// Immediate search: normalize, rank, reset the selection, and advance
    /// the render generation so in-flight completions from older searches
    /// become stale.
    pub fn search(&mut self, query: &str) {
        let started = Instant::now();
        self.tokens = search::normalize(query);
        self.results = search::rank(self.catalog.entries(), &self.tokens);
        self.selection = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!(
            query,
            tokens = self.tokens.len(),
            results = self.results.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "search"
        );
    }

    /// Ticket for the current render generation.
    pub fn ticket(&self) -> RenderTicket {
        RenderTicket {
            shared: Arc::clone(&self.generation),
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    /// Builds the card subtree for the current results, runs the typeset
    /// chain, then applies post-render highlighting, strictly in that order.
    /// The highlight step is guarded by the render generation.
    pub async fn render(&self) -> RenderedView {
        let patterns = TokenPatterns::compile(&self.tokens);
        let mut doc = Document::new();
        let root = render::build_cards(&mut doc, &self.results, &patterns);
        let ticket = self.ticket();
        finish_render(&mut doc, root, &patterns, self.engine, &ticket).await;
        RenderedView { doc, root }
    }

    /// Moves the selection to the next card, clamped to the last one.
    pub fn select_next(&mut self) {
        if self.results.is_empty() {
            return;
        }
        self.selection = Some(match self.selection {
            None => 0,
            Some(index) => (index + 1).min(self.results.len() - 1),
        });
    }

    /// Moves the selection to the previous card; stepping back from the
    /// first clears it.
    pub fn select_previous(&mut self) {
        self.selection = match self.selection {
            None | Some(0) => None,
            Some(index) => Some(index - 1),
        };
    }

    /// Resolves the selected card to its outbound link.
    pub fn activate(&self) -> Option<&'a str> {
        self.selection
            .and_then(|index| self.results.get(index))
            .map(|entry| entry.link.as_str())
    }
}

/// Completion continuation shared by every typeset path: typeset (or not),
/// then post-render highlight, skipped when a newer search has rendered
/// since the ticket was captured.
pub async fn finish_render(
    doc: &mut Document,
    root: NodeId,
    patterns: &TokenPatterns,
    engine: Option<&dyn Typesetter>,
    ticket: &RenderTicket,
) {
    render::run_typeset(doc, root, engine).await;
    if ticket.is_current() {
        dom::highlight_rendered(doc, root, patterns);
    } else {
        debug!(
            generation = ticket.generation(),
            "stale typeset completion; skipping post-render highlight"
        );
    }
}

/// The rendered card tree for one search generation.
pub struct RenderedView {
    pub doc: Document,
    pub root: NodeId,
}

impl RenderedView {
    pub fn to_html(&self) -> String {
        self.doc.to_html(self.root)
    }

    pub fn text(&self) -> String {
        self.doc.text_content(self.root)
    }
}
