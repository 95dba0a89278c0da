//! Anchoring highlights into a live document.
//!
//! A highlight is a `<span>` wrapper around the selected content, tagged with
//! a class and an id attribute. The wrapper also holds a small badge element
//! (the indicator) that shows how many comments the thread has. The badge is
//! markup only and is never treated as part of the highlighted text.

mod region;
mod strategy;

use std::rc::Rc;

use log::{debug, error, warn};

use crate::dom::{Checkpoint, Document, Handle, Range, node};

pub use region::{COUNT_ATTRIBUTE, HighlightId, HighlightRegion, HighlightStyle, IdGenerator};
pub(crate) use region::monotonic_millis;
pub use strategy::{ExtractAndWrap, SplitTextNode, WrapError, WrapStrategy, default_strategies};

pub struct AnchorEngine {
    style: HighlightStyle,
    ids: IdGenerator,
    strategies: Vec<Box<dyn WrapStrategy>>,
}

impl AnchorEngine {
    pub fn new(style: HighlightStyle) -> Self {
        Self::with_strategies(style, default_strategies())
    }

    /// Engine that tries `strategies` in order until one succeeds.
    pub fn with_strategies(style: HighlightStyle, strategies: Vec<Box<dyn WrapStrategy>>) -> Self {
        Self {
            style,
            ids: IdGenerator::default(),
            strategies,
        }
    }

    pub fn style(&self) -> &HighlightStyle {
        &self.style
    }

    /// Wraps the selected content in a new highlight region.
    ///
    /// Returns `None` for blank selections, for selections that cut through an
    /// existing region and when every strategy fails. A failed strategy leaves
    /// the document exactly as it found it.
    pub fn wrap(&mut self, document: &Document, range: &Range) -> Option<HighlightRegion> {
        let selected = range.text();
        if selected.trim().is_empty() {
            debug!("Ignoring highlight request for a blank selection");
            return None;
        }
        if !document.contains(&range.start().node) || !document.contains(&range.end().node) {
            warn!("Ignoring highlight request for a selection outside the document");
            return None;
        }
        if self.splits_region(range) {
            warn!("Ignoring highlight request that partly overlaps an existing highlight");
            return None;
        }

        let ancestor = range.common_ancestor();
        let scope = if node::is_container(&ancestor) {
            ancestor
        } else {
            node::parent(&ancestor)?
        };

        let id = self.fresh_id(document);
        for strategy in &self.strategies {
            let checkpoint = Checkpoint::capture(&scope);
            let wrapper = self.style.build_wrapper(&id);
            match strategy.apply(range, &wrapper) {
                Ok(()) => {
                    node::append_child(&wrapper, &self.style.build_indicator());
                    debug!(
                        "Highlighted {} characters as {id} using {}",
                        selected.chars().count(),
                        strategy.name()
                    );
                    return Some(HighlightRegion::new(id, wrapper));
                }
                Err(e) => {
                    warn!("Highlight strategy {} failed: {e}", strategy.name());
                    checkpoint.rollback(&wrapper);
                }
            }
        }

        error!(
            "Could not highlight selection {:?}",
            selected.chars().take(80).collect::<String>()
        );
        None
    }

    fn fresh_id(&mut self, document: &Document) -> HighlightId {
        loop {
            let id = self.ids.next_id();
            if self.find_region_by_id(document, &id).is_none() {
                return id;
            }
        }
    }

    /// True when exactly one boundary of `range` lies inside some region.
    /// Wrapping such a range would split that region into two elements
    /// carrying the same id.
    fn splits_region(&self, range: &Range) -> bool {
        let start = self.enclosing_regions(&range.start().node);
        let end = self.enclosing_regions(&range.end().node);
        start.len() != end.len() || start.iter().zip(&end).any(|(a, b)| !Rc::ptr_eq(a, b))
    }

    fn enclosing_regions(&self, target: &Handle) -> Vec<Handle> {
        let mut regions = Vec::new();
        let mut current = Some(target.clone());
        while let Some(candidate) = current {
            if self.is_region(&candidate) {
                regions.push(candidate.clone());
            }
            current = node::parent(&candidate);
        }
        regions
    }

    /// Every element carrying `id`, in document order. Normally one; pages
    /// saved by other tools can hold split copies.
    fn regions_with_id(&self, document: &Document, id: &HighlightId) -> Vec<Handle> {
        document.find_all(|candidate| {
            self.is_region(candidate)
                && node::attribute(candidate, &self.style.id_attribute).as_deref()
                    == Some(id.as_str())
        })
    }

    pub fn is_region(&self, candidate: &Handle) -> bool {
        node::has_class(candidate, &self.style.class_name)
            && node::attribute(candidate, &self.style.id_attribute).is_some()
    }

    pub fn is_indicator(&self, candidate: &Handle) -> bool {
        node::has_class(candidate, &self.style.indicator_class)
    }

    pub fn find_region_by_id(&self, document: &Document, id: &HighlightId) -> Option<Handle> {
        document.find_first(|candidate| {
            self.is_region(candidate)
                && node::attribute(candidate, &self.style.id_attribute).as_deref()
                    == Some(id.as_str())
        })
    }

    /// Ids of every region in the document, in document order.
    pub fn region_ids(&self, document: &Document) -> Vec<HighlightId> {
        document
            .find_all(|candidate| self.is_region(candidate))
            .iter()
            .filter_map(|region| node::attribute(region, &self.style.id_attribute))
            .map(HighlightId::new)
            .collect()
    }

    /// The region enclosing `target`, if any.
    pub fn region_at(&self, target: &Handle) -> Option<HighlightId> {
        let mut current = Some(target.clone());
        while let Some(candidate) = current {
            if self.is_region(&candidate) {
                return node::attribute(&candidate, &self.style.id_attribute).map(HighlightId::new);
            }
            current = node::parent(&candidate);
        }
        None
    }

    /// Text of a region without its indicator.
    pub fn region_text(&self, region: &Handle) -> String {
        node::text_content(region, &|candidate| self.is_indicator(candidate))
    }

    /// Replaces every element of the region with a plain text node holding
    /// its text.
    ///
    /// Inline formatting that was inside the region is flattened. Returns
    /// false when no such region exists.
    pub fn dissolve(&self, document: &Document, id: &HighlightId) -> bool {
        let regions = self.regions_with_id(document, id);
        if regions.is_empty() {
            debug!("No highlight {id} to dissolve");
            return false;
        }
        for region in &regions {
            // A copy nested in an earlier one is already gone with it.
            if !document.contains(region) {
                continue;
            }
            let text = node::create_text(&self.region_text(region));
            if !node::replace(region, &text) {
                warn!("Highlight {id} is detached and cannot be dissolved");
            }
        }
        debug!("Dissolved highlight {id} ({} elements)", regions.len());
        true
    }

    /// Shows `count` on the region's indicator; zero hides it. Only the first
    /// element of a split region gets a visible badge.
    pub fn set_comment_count(&self, document: &Document, id: &HighlightId, count: usize) -> bool {
        let regions = self.regions_with_id(document, id);
        for (index, region) in regions.iter().enumerate() {
            let shown = if index == 0 { count } else { 0 };
            self.show_count(region, shown);
        }
        !regions.is_empty()
    }

    fn show_count(&self, region: &Handle, count: usize) {
        let indicator = match node::children(region)
            .into_iter()
            .find(|child| self.is_indicator(child))
        {
            Some(indicator) => indicator,
            None => {
                let indicator = self.style.build_indicator();
                node::append_child(region, &indicator);
                indicator
            }
        };

        node::set_attribute(&indicator, COUNT_ATTRIBUTE, &count.to_string());
        node::set_attribute(&indicator, "style", &HighlightStyle::indicator_css(count > 0));
        let label = if count > 0 { count.to_string() } else { String::new() };
        node::set_text_content(&indicator, &label);
    }
}
