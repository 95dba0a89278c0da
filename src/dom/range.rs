use std::cmp::Ordering;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};
use thiserror::Error;

use super::node;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("boundary container must be a text, element or document node")]
    InvalidContainer,
    #[error("offset {offset} is past the end of a node of length {length}")]
    OffsetOutOfBounds { offset: usize, length: usize },
    #[error("range boundaries belong to different trees")]
    Disconnected,
    #[error("range end precedes its start")]
    Backwards,
    #[error("selection is empty")]
    EmptySelection,
    #[error("character span {start}..{end} falls outside {length} characters of text")]
    TextOutOfBounds {
        start: usize,
        end: usize,
        length: usize,
    },
    #[error("text {0:?} not found")]
    QuoteNotFound(String),
    #[error("hierarchy request: {0}")]
    HierarchyRequest(&'static str),
}

/// A position in the tree: a container plus an offset into it.
///
/// For text the offset counts characters, for elements and documents it
/// counts children.
#[derive(Debug, Clone)]
pub struct BoundaryPoint {
    pub node: Handle,
    pub offset: usize,
}

impl BoundaryPoint {
    pub fn new(node: Handle, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A contiguous span of a document between two boundary points.
#[derive(Debug, Clone)]
pub struct Range {
    start: BoundaryPoint,
    end: BoundaryPoint,
}

impl Range {
    pub fn new(start: BoundaryPoint, end: BoundaryPoint) -> Result<Self, RangeError> {
        validate(&start)?;
        validate(&end)?;
        if !Rc::ptr_eq(&node::root_of(&start.node), &node::root_of(&end.node)) {
            return Err(RangeError::Disconnected);
        }
        if compare_points(&start, &end) == Ordering::Greater {
            return Err(RangeError::Backwards);
        }
        Ok(Self { start, end })
    }

    /// Maps a character span of the text under `root` onto a range.
    ///
    /// Text inside nodes for which `skip` returns true is not counted. Each
    /// boundary lands inside a text node, never between nodes, so the range
    /// covers exactly the requested characters.
    pub fn from_text_offsets(
        root: &Handle,
        start: usize,
        end: usize,
        skip: &dyn Fn(&Handle) -> bool,
    ) -> Result<Self, RangeError> {
        let segments = text_segments(root, skip);
        let length = segments.last().map_or(0, |s| s.offset + s.length);
        if start == end {
            return Err(RangeError::EmptySelection);
        }
        if start > end || end > length {
            return Err(RangeError::TextOutOfBounds { start, end, length });
        }

        let first = segments
            .iter()
            .find(|s| s.offset <= start && start < s.offset + s.length);
        let last = segments
            .iter()
            .find(|s| s.offset < end && end <= s.offset + s.length);

        match (first, last) {
            (Some(first), Some(last)) => Self::new(
                BoundaryPoint::new(first.node.clone(), start - first.offset),
                BoundaryPoint::new(last.node.clone(), end - last.offset),
            ),
            _ => Err(RangeError::TextOutOfBounds { start, end, length }),
        }
    }

    /// Range over the `occurrence`-th (zero based) match of `quote`.
    pub fn find_text(
        root: &Handle,
        quote: &str,
        occurrence: usize,
        skip: &dyn Fn(&Handle) -> bool,
    ) -> Result<Self, RangeError> {
        if quote.is_empty() {
            return Err(RangeError::EmptySelection);
        }
        let text = node::text_content(root, skip);
        let (byte_index, _) = text
            .match_indices(quote)
            .nth(occurrence)
            .ok_or_else(|| RangeError::QuoteNotFound(quote.to_string()))?;
        let start = text[..byte_index].chars().count();
        Self::from_text_offsets(root, start, start + quote.chars().count(), skip)
    }

    pub fn start(&self) -> &BoundaryPoint {
        &self.start
    }

    pub fn end(&self) -> &BoundaryPoint {
        &self.end
    }

    pub fn is_collapsed(&self) -> bool {
        Rc::ptr_eq(&self.start.node, &self.end.node) && self.start.offset == self.end.offset
    }

    /// Deepest node that is an inclusive ancestor of both boundaries.
    pub fn common_ancestor(&self) -> Handle {
        let mut candidate = self.start.node.clone();
        loop {
            if node::is_inclusive_ancestor(&candidate, &self.end.node) {
                return candidate;
            }
            match node::parent(&candidate) {
                Some(up) => candidate = up,
                None => return candidate,
            }
        }
    }

    /// True when all of `target` lies inside the range.
    pub fn contains_node(&self, target: &Handle) -> bool {
        if !Rc::ptr_eq(&node::root_of(target), &node::root_of(&self.start.node)) {
            return false;
        }
        let before = BoundaryPoint::new(target.clone(), 0);
        let after = BoundaryPoint::new(target.clone(), node::node_length(target));
        compare_points(&before, &self.start) == Ordering::Greater
            && compare_points(&after, &self.end) == Ordering::Less
    }

    /// The selected characters, in document order.
    pub fn text(&self) -> String {
        let (start, end) = (&self.start, &self.end);
        if Rc::ptr_eq(&start.node, &end.node) {
            if let Some(data) = node::text_data(&start.node) {
                return node::char_slice(&data, start.offset, end.offset).to_string();
            }
        }

        let mut out = String::new();
        if let Some(data) = node::text_data(&start.node) {
            out.push_str(node::char_slice(&data, start.offset, usize::MAX));
        }
        for candidate in node::descendants(&self.common_ancestor()) {
            if node::is_text(&candidate) && self.contains_node(&candidate) {
                out.push_str(&node::text_data(&candidate).unwrap_or_default());
            }
        }
        if let Some(data) = node::text_data(&end.node) {
            out.push_str(node::char_slice(&data, 0, end.offset));
        }
        out
    }

    /// Moves the selected content into a new fragment, splitting partially
    /// selected nodes the way `Range.extractContents` does in a browser.
    ///
    /// Afterwards the range is collapsed at the point where the content was.
    /// Validation happens before any mutation, so an error leaves the tree
    /// untouched.
    pub fn extract_contents(&mut self) -> Result<Handle, RangeError> {
        let ancestor = self.common_ancestor();
        if node::children(&ancestor)
            .iter()
            .any(|child| node::is_doctype(child) && self.contains_node(child))
        {
            return Err(RangeError::HierarchyRequest("a doctype cannot be extracted"));
        }
        Ok(self.extract_unchecked())
    }

    fn extract_unchecked(&mut self) -> Handle {
        let fragment = node::create_fragment();
        if self.is_collapsed() {
            return fragment;
        }

        let (start_node, start_offset) = (self.start.node.clone(), self.start.offset);
        let (end_node, end_offset) = (self.end.node.clone(), self.end.offset);

        if Rc::ptr_eq(&start_node, &end_node) {
            if let Some(data) = node::text_data(&start_node) {
                let selected = node::char_slice(&data, start_offset, end_offset);
                node::append_child(&fragment, &node::create_text(selected));
                let kept = format!(
                    "{}{}",
                    node::char_slice(&data, 0, start_offset),
                    node::char_slice(&data, end_offset, usize::MAX)
                );
                node::set_text_data(&start_node, &kept);
                self.end = self.start.clone();
                return fragment;
            }
        }

        let ancestor = self.common_ancestor();
        let siblings = node::children(&ancestor);

        let first_partial = if node::is_inclusive_ancestor(&start_node, &end_node) {
            None
        } else {
            siblings
                .iter()
                .find(|child| node::is_inclusive_ancestor(child, &start_node))
                .cloned()
        };
        let last_partial = if node::is_inclusive_ancestor(&end_node, &start_node) {
            None
        } else {
            siblings
                .iter()
                .rev()
                .find(|child| node::is_inclusive_ancestor(child, &end_node))
                .cloned()
        };
        let contained: Vec<Handle> = siblings
            .iter()
            .filter(|child| self.contains_node(child))
            .cloned()
            .collect();

        let collapse_to = if node::is_inclusive_ancestor(&start_node, &end_node) {
            BoundaryPoint::new(start_node.clone(), start_offset)
        } else {
            let mut reference = start_node.clone();
            while let Some(up) = node::parent(&reference) {
                if node::is_inclusive_ancestor(&up, &end_node) {
                    break;
                }
                reference = up;
            }
            let index = node::index_in_parent(&reference).map_or(0, |i| i + 1);
            BoundaryPoint::new(node::parent(&reference).unwrap_or(ancestor), index)
        };

        if let Some(first) = &first_partial {
            if let Some(data) = node::text_data(first) {
                let tail = node::char_slice(&data, start_offset, usize::MAX);
                node::append_child(&fragment, &node::create_text(tail));
                node::set_text_data(first, node::char_slice(&data, 0, start_offset));
            } else {
                let clone = node::shallow_clone(first);
                node::append_child(&fragment, &clone);
                let mut inner = Range {
                    start: self.start.clone(),
                    end: BoundaryPoint::new(first.clone(), node::node_length(first)),
                };
                node::move_children(&inner.extract_unchecked(), &clone);
            }
        }

        for child in &contained {
            node::append_child(&fragment, child);
        }

        if let Some(last) = &last_partial {
            if let Some(data) = node::text_data(last) {
                let head = node::char_slice(&data, 0, end_offset);
                node::append_child(&fragment, &node::create_text(head));
                node::set_text_data(last, node::char_slice(&data, end_offset, usize::MAX));
            } else {
                let clone = node::shallow_clone(last);
                node::append_child(&fragment, &clone);
                let mut inner = Range {
                    start: BoundaryPoint::new(last.clone(), 0),
                    end: self.end.clone(),
                };
                node::move_children(&inner.extract_unchecked(), &clone);
            }
        }

        self.start = collapse_to.clone();
        self.end = collapse_to;
        fragment
    }

    /// Inserts `new_node` at the start of the range, splitting a text start
    /// container when needed.
    pub fn insert_node(&mut self, new_node: &Handle) -> Result<(), RangeError> {
        let start_node = self.start.node.clone();
        let start_offset = self.start.offset;
        let starts_in_text = node::is_text(&start_node);

        let parent = if starts_in_text {
            node::parent(&start_node)
                .ok_or(RangeError::HierarchyRequest("text boundary has no parent"))?
        } else {
            start_node.clone()
        };
        if !node::is_container(&parent) {
            return Err(RangeError::HierarchyRequest("insertion point cannot hold children"));
        }
        if node::is_inclusive_ancestor(new_node, &parent) {
            return Err(RangeError::HierarchyRequest(
                "node would become its own descendant",
            ));
        }

        let was_collapsed = self.is_collapsed();
        let reference = if starts_in_text {
            let end_in_tail =
                Rc::ptr_eq(&self.end.node, &start_node) && self.end.offset > start_offset;
            let tail = node::split_text(&start_node, start_offset);
            if let (true, Some(tail)) = (end_in_tail, &tail) {
                self.end = BoundaryPoint::new(tail.clone(), self.end.offset - start_offset);
            }
            tail
        } else {
            node::child_at(&start_node, start_offset)
        };

        node::insert_before(&parent, new_node, reference.as_ref());
        let index = node::index_in_parent(new_node).unwrap_or(0);

        if was_collapsed {
            self.end = BoundaryPoint::new(parent, index + 1);
        } else if Rc::ptr_eq(&self.end.node, &parent) && self.end.offset > index {
            self.end.offset += 1;
        }
        Ok(())
    }
}

fn validate(point: &BoundaryPoint) -> Result<(), RangeError> {
    match point.node.data {
        NodeData::Text { .. } | NodeData::Element { .. } | NodeData::Document => {}
        _ => return Err(RangeError::InvalidContainer),
    }
    let length = node::node_length(&point.node);
    if point.offset > length {
        return Err(RangeError::OffsetOutOfBounds {
            offset: point.offset,
            length,
        });
    }
    Ok(())
}

/// Orders two boundary points of the same tree.
pub(crate) fn compare_points(a: &BoundaryPoint, b: &BoundaryPoint) -> Ordering {
    if Rc::ptr_eq(&a.node, &b.node) {
        return a.offset.cmp(&b.offset);
    }
    let a_path = node::path_from_root(&a.node);
    let b_path = node::path_from_root(&b.node);

    if b_path.starts_with(&a_path) {
        let child_index = b_path[a_path.len()];
        return if child_index < a.offset {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if a_path.starts_with(&b_path) {
        let child_index = a_path[b_path.len()];
        return if child_index < b.offset {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }
    a_path.cmp(&b_path)
}

struct TextSegment {
    node: Handle,
    offset: usize,
    length: usize,
}

fn text_segments(root: &Handle, skip: &dyn Fn(&Handle) -> bool) -> Vec<TextSegment> {
    let mut segments = Vec::new();
    let mut offset = 0;
    let mut stack = vec![root.clone()];
    while let Some(current) = stack.pop() {
        if skip(&current) {
            continue;
        }
        if node::is_text(&current) {
            let length = node::node_length(&current);
            segments.push(TextSegment {
                node: current,
                offset,
                length,
            });
            offset += length;
            continue;
        }
        stack.extend(current.children.borrow().iter().rev().cloned());
    }
    segments
}
