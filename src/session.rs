//! One page with its highlights and comment threads.
//!
//! A session owns the parsed document, the anchor engine and the comment
//! store for the page's origin. At most one thread is open at a time. A
//! thread that is closed while still empty takes its highlight with it.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::anchor::{AnchorEngine, HighlightId};
use crate::comments::{CommentRecord, CommentStore, DeleteOutcome};
use crate::dom::{Document, Handle, Range, RangeError, node};
use crate::settings::Settings;
use crate::storage::KeyValueStore;
use crate::theme::PageTheme;

/// What the thread editor shows for one highlight.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadView {
    pub highlight_id: HighlightId,
    pub quote: String,
    pub comments: Vec<CommentRecord>,
    pub theme: PageTheme,
}

pub struct Session<S> {
    document: Document,
    engine: AnchorEngine,
    store: CommentStore<S>,
    page_url: String,
    active_thread: Option<HighlightId>,
    pending: Vec<HighlightId>,
}

impl<S: KeyValueStore> Session<S> {
    /// Loads the origin's comments and reconciles them with the page.
    ///
    /// Regions already in the page without any stored comment are
    /// dissolved. Threads whose region is missing are kept in storage and
    /// reported by [`Session::pending_anchors`].
    pub fn start(
        document: Document,
        storage: S,
        settings: &Settings,
        page_url: impl Into<String>,
    ) -> Self {
        let mut session = Self {
            document,
            engine: AnchorEngine::new(settings.highlight_style()),
            store: CommentStore::load(storage, settings.storage_key.clone()),
            page_url: page_url.into(),
            active_thread: None,
            pending: Vec::new(),
        };
        session.sweep_empty_regions();
        session.refresh_indicators();
        session
    }

    fn sweep_empty_regions(&mut self) {
        for id in self.engine.region_ids(&self.document) {
            if self.store.comment_count(&id) == 0 {
                info!("Dissolving highlight {id}: it has no comments");
                self.engine.dissolve(&self.document, &id);
            }
        }
    }

    /// Sets every region's indicator from the store and recomputes which
    /// threads have no region in the page.
    pub fn refresh_indicators(&mut self) {
        self.pending.clear();
        for id in self.store.highlight_ids() {
            let count = self.store.comment_count(id);
            if !self.engine.set_comment_count(&self.document, id, count) {
                self.pending.push(id.clone());
            }
        }
        if !self.pending.is_empty() {
            info!(
                "{} comment threads have no highlight in this page",
                self.pending.len()
            );
        }
    }

    fn selection_root(&self) -> Handle {
        self.document.body().unwrap_or_else(|| self.document.root())
    }

    fn is_unselectable(&self, candidate: &Handle) -> bool {
        self.engine.is_indicator(candidate) || node::is_non_rendered(candidate)
    }

    /// Range over the `occurrence`-th match of `quote` in the page text.
    pub fn select_text(&self, quote: &str, occurrence: usize) -> Result<Range, RangeError> {
        Range::find_text(&self.selection_root(), quote, occurrence, &|candidate| {
            self.is_unselectable(candidate)
        })
    }

    /// Range over a character span of the page text.
    pub fn select_offsets(&self, start: usize, end: usize) -> Result<Range, RangeError> {
        Range::from_text_offsets(&self.selection_root(), start, end, &|candidate| {
            self.is_unselectable(candidate)
        })
    }

    /// Wraps `range` in a new highlight and opens its (empty) thread.
    ///
    /// Any open thread is closed first. If that dissolved an empty highlight
    /// the range was pointing into, the range is stale and nothing happens.
    /// Ranges that cut through an existing highlight are refused.
    pub fn begin_highlight(&mut self, range: &Range) -> Option<HighlightId> {
        self.close_thread();
        if !self.document.contains(&range.start().node) || !self.document.contains(&range.end().node) {
            warn!("Selection no longer belongs to the page");
            return None;
        }
        let region = self.engine.wrap(&self.document, range)?;
        let id = region.id().clone();
        self.active_thread = Some(id.clone());
        Some(id)
    }

    /// Opens the thread of an existing highlight.
    pub fn open_thread(&mut self, id: &HighlightId) -> Option<ThreadView> {
        if self.active_thread.as_ref() != Some(id) {
            self.close_thread();
        }
        let Some(region) = self.engine.find_region_by_id(&self.document, id) else {
            debug!("No highlight {id} in this page");
            return None;
        };
        self.active_thread = Some(id.clone());
        Some(ThreadView {
            highlight_id: id.clone(),
            quote: self.engine.region_text(&region),
            comments: self.store.list(id).to_vec(),
            theme: PageTheme::detect(&self.document),
        })
    }

    /// Opens the thread of the highlight enclosing `target`, if any.
    pub fn click(&mut self, target: &Handle) -> Option<ThreadView> {
        let id = self.engine.region_at(target)?;
        self.open_thread(&id)
    }

    /// Adds a comment to the open thread.
    pub fn submit_comment(&mut self, text: &str, now: DateTime<Utc>) -> Result<Option<CommentRecord>> {
        let Some(id) = self.active_thread.clone() else {
            bail!("No comment thread is open");
        };
        let record = self.store.add_comment(&id, text, &self.page_url, now)?;
        if record.is_some() {
            let count = self.store.comment_count(&id);
            self.engine.set_comment_count(&self.document, &id, count);
        }
        Ok(record)
    }

    /// Deletes one comment; the last one dissolves the highlight and closes
    /// its thread.
    pub fn delete_comment(&mut self, id: &HighlightId, comment_id: i64) -> Result<DeleteOutcome> {
        let outcome = self.store.delete_comment(id, comment_id)?;
        match &outcome {
            DeleteOutcome::ThreadEmptied => {
                self.engine.dissolve(&self.document, id);
                self.pending.retain(|pending| pending != id);
                if self.active_thread.as_ref() == Some(id) {
                    self.active_thread = None;
                }
            }
            DeleteOutcome::Removed { remaining } => {
                self.engine.set_comment_count(&self.document, id, *remaining);
            }
            DeleteOutcome::NotFound => debug!("No comment {comment_id} in thread {id}"),
        }
        Ok(outcome)
    }

    /// Closes the open thread. Returns true when that dissolved an empty
    /// highlight.
    pub fn close_thread(&mut self) -> bool {
        let Some(id) = self.active_thread.take() else {
            return false;
        };
        if self.store.comment_count(&id) == 0 {
            self.engine.dissolve(&self.document, &id)
        } else {
            false
        }
    }

    pub fn active_thread(&self) -> Option<&HighlightId> {
        self.active_thread.as_ref()
    }

    /// Threads with stored comments but no highlight in this page.
    pub fn pending_anchors(&self) -> &[HighlightId] {
        &self.pending
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn engine(&self) -> &AnchorEngine {
        &self.engine
    }

    pub fn store(&self) -> &CommentStore<S> {
        &self.store
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub fn into_parts(self) -> (Document, CommentStore<S>) {
        (self.document, self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    const URL: &str = "https://chat.example.com/c/1";

    fn at(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, seconds).unwrap()
    }

    fn session(html: &str) -> Session<MemoryStore> {
        Session::start(Document::parse(html), MemoryStore::new(), &Settings::default(), URL)
    }

    #[test]
    fn test_cancelled_thread_leaves_no_highlight() {
        let mut session = session("<p>some text here</p>");
        let range = session.select_text("text", 0).unwrap();
        let id = session.begin_highlight(&range).unwrap();
        assert_eq!(session.active_thread(), Some(&id));

        assert!(session.close_thread());
        assert!(session.engine().region_ids(session.document()).is_empty());
        assert_eq!(session.document().text_content(), "some text here");
    }

    #[test]
    fn test_opening_another_thread_drops_empty_highlight() {
        let mut session = session("<p>first second</p>");
        let kept = session
            .begin_highlight(&session.select_text("first", 0).unwrap())
            .unwrap();
        session.submit_comment("note", at(0)).unwrap();

        let abandoned = session
            .begin_highlight(&session.select_text("second", 0).unwrap())
            .unwrap();
        let view = session.open_thread(&kept).unwrap();

        assert_eq!(view.quote, "first");
        assert_eq!(view.comments.len(), 1);
        assert!(session.engine().find_region_by_id(session.document(), &abandoned).is_none());
    }

    #[test]
    fn test_submit_without_open_thread_fails() {
        let mut session = session("<p>x</p>");
        assert!(session.submit_comment("hello", at(0)).is_err());
    }

    #[test]
    fn test_blank_comment_keeps_thread_empty() {
        let mut session = session("<p>abc def</p>");
        session
            .begin_highlight(&session.select_text("def", 0).unwrap())
            .unwrap();
        assert!(session.submit_comment("   ", at(0)).unwrap().is_none());
        assert!(session.close_thread());
        assert_eq!(session.document().text_content(), "abc def");
    }

    #[test]
    fn test_delete_last_comment_dissolves_and_closes() {
        let mut session = session("<p>delete me please</p>");
        let id = session
            .begin_highlight(&session.select_text("me", 0).unwrap())
            .unwrap();
        let first = session.submit_comment("one", at(0)).unwrap().unwrap();
        let second = session.submit_comment("two", at(1)).unwrap().unwrap();

        assert_eq!(
            session.delete_comment(&id, first.id).unwrap(),
            DeleteOutcome::Removed { remaining: 1 }
        );
        assert!(session.engine().find_region_by_id(session.document(), &id).is_some());

        assert_eq!(
            session.delete_comment(&id, second.id).unwrap(),
            DeleteOutcome::ThreadEmptied
        );
        assert!(session.active_thread().is_none());
        assert!(session.engine().find_region_by_id(session.document(), &id).is_none());
        assert_eq!(session.document().text_content(), "delete me please");
    }

    #[test]
    fn test_click_inside_region_opens_thread() {
        let mut session = session("<p>tap <b>here</b> now</p>");
        let id = session
            .begin_highlight(&session.select_text("tap here", 0).unwrap())
            .unwrap();
        session.submit_comment("clicked", at(0)).unwrap();
        session.close_thread();

        let bold = session
            .document()
            .find_first(|n| node::tag_name(n) == Some("b"))
            .unwrap();
        let view = session.click(&bold).unwrap();
        assert_eq!(view.highlight_id, id);
        assert_eq!(view.theme, PageTheme::Light);

        let paragraph = session
            .document()
            .find_first(|n| node::tag_name(n) == Some("p"))
            .unwrap();
        assert!(session.click(&paragraph).is_none());
    }

    #[test]
    fn test_selection_ignores_indicator_badges() {
        let mut session = session("<p>alpha beta gamma</p>");
        session
            .begin_highlight(&session.select_text("beta", 0).unwrap())
            .unwrap();
        session.submit_comment("first", at(0)).unwrap();
        session.close_thread();

        assert!(session.document().text_content().contains("beta1 gamma"));
        let range = session.select_text("beta gamma", 0).unwrap();
        assert_eq!(node::text_data(&range.start().node).as_deref(), Some("beta"));
        assert_eq!(node::text_data(&range.end().node).as_deref(), Some(" gamma"));
    }
}
