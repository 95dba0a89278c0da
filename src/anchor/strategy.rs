use std::rc::Rc;

use thiserror::Error;

use crate::dom::{Handle, Range, RangeError, node};

#[derive(Debug, Error)]
pub enum WrapError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error("selection does not sit inside a single text node")]
    NotSingleTextNode,
    #[error("selected text node is not attached to a parent")]
    Detached,
}

/// One way of moving a selection into a wrapper element.
///
/// Implementations may only touch nodes under the range's common container;
/// the engine rolls that subtree back when `apply` fails.
pub trait WrapStrategy {
    fn name(&self) -> &'static str;
    fn apply(&self, range: &Range, wrapper: &Handle) -> Result<(), WrapError>;
}

/// Extracts the selection (splitting partially selected elements) and inserts
/// the wrapper in its place. Works for any selection.
pub struct ExtractAndWrap;

impl WrapStrategy for ExtractAndWrap {
    fn name(&self) -> &'static str {
        "extract-and-wrap"
    }

    fn apply(&self, range: &Range, wrapper: &Handle) -> Result<(), WrapError> {
        let mut range = range.clone();
        let fragment = range.extract_contents()?;
        node::move_children(&fragment, wrapper);
        range.insert_node(wrapper)?;
        Ok(())
    }
}

/// Replaces a single text node with `before`, the wrapper and `after`.
pub struct SplitTextNode;

impl WrapStrategy for SplitTextNode {
    fn name(&self) -> &'static str {
        "split-text-node"
    }

    fn apply(&self, range: &Range, wrapper: &Handle) -> Result<(), WrapError> {
        let (start, end) = (range.start(), range.end());
        if !Rc::ptr_eq(&start.node, &end.node) {
            return Err(WrapError::NotSingleTextNode);
        }
        let text_node = &start.node;
        let data = node::text_data(text_node).ok_or(WrapError::NotSingleTextNode)?;
        let parent = node::parent(text_node).ok_or(WrapError::Detached)?;

        let before = node::create_text(node::char_slice(&data, 0, start.offset));
        let after = node::create_text(node::char_slice(&data, end.offset, usize::MAX));
        let selected = node::create_text(node::char_slice(&data, start.offset, end.offset));
        node::append_child(wrapper, &selected);

        for piece in [&before, wrapper, &after] {
            node::insert_before(&parent, piece, Some(text_node));
        }
        node::remove(text_node);
        Ok(())
    }
}

pub fn default_strategies() -> Vec<Box<dyn WrapStrategy>> {
    vec![Box::new(ExtractAndWrap), Box::new(SplitTextNode)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn test_split_text_node_wraps_middle() {
        let document = Document::parse("<p>hello world</p>");
        let body = document.body().unwrap();
        let range = Range::from_text_offsets(&body, 0, 5, &|_| false).unwrap();
        let wrapper = node::create_element("mark", &[]);

        SplitTextNode.apply(&range, &wrapper).unwrap();
        let html = document.to_html().unwrap();
        assert!(html.contains("<p><mark>hello</mark> world</p>"));
    }

    #[test]
    fn test_split_text_node_refuses_multi_node_selection() {
        let document = Document::parse("<p>a<b>b</b>c</p>");
        let body = document.body().unwrap();
        let range = Range::from_text_offsets(&body, 0, 3, &|_| false).unwrap();
        let wrapper = node::create_element("mark", &[]);

        let err = SplitTextNode.apply(&range, &wrapper).unwrap_err();
        assert!(matches!(err, WrapError::NotSingleTextNode));
    }

    #[test]
    fn test_extract_and_wrap_keeps_text() {
        let document = Document::parse("<p>a<b>b</b>c</p>");
        let body = document.body().unwrap();
        let range = Range::from_text_offsets(&body, 0, 3, &|_| false).unwrap();
        let wrapper = node::create_element("mark", &[]);

        ExtractAndWrap.apply(&range, &wrapper).unwrap();
        assert_eq!(document.text_content(), "abc");
        assert_eq!(node::text_content(&wrapper, &|_| false), "abc");
    }
}
