//! A small mutable HTML document model built on html5ever and rcdom.

mod checkpoint;
pub mod node;
mod range;

use std::fmt;

use anyhow::{Context, Result};
use html5ever::serialize::{SerializeOpts, TraversalScope, serialize};
use html5ever::tendril::TendrilSink;
use html5ever::{ParseOpts, parse_document};
use markup5ever_rcdom::{RcDom, SerializableHandle};

pub use checkpoint::Checkpoint;
pub use markup5ever_rcdom::Handle;
pub use range::{BoundaryPoint, Range, RangeError};

pub struct Document {
    dom: RcDom,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
        Self { dom }
    }

    pub fn root(&self) -> Handle {
        self.dom.document.clone()
    }

    /// The `<html>` element.
    pub fn document_element(&self) -> Option<Handle> {
        node::children(&self.dom.document)
            .into_iter()
            .find(node::is_element)
    }

    pub fn body(&self) -> Option<Handle> {
        self.find_first(|n| node::tag_name(n) == Some("body"))
    }

    pub fn find_first(&self, predicate: impl Fn(&Handle) -> bool) -> Option<Handle> {
        node::descendants(&self.dom.document)
            .into_iter()
            .find(|n| predicate(n))
    }

    pub fn find_all(&self, predicate: impl Fn(&Handle) -> bool) -> Vec<Handle> {
        node::descendants(&self.dom.document)
            .into_iter()
            .filter(|n| predicate(n))
            .collect()
    }

    pub fn contains(&self, target: &Handle) -> bool {
        node::is_inclusive_ancestor(&self.dom.document, target)
    }

    pub fn text_content(&self) -> String {
        node::text_content(&self.dom.document, &|_| false)
    }

    pub fn to_html(&self) -> Result<String> {
        let mut bytes = Vec::new();
        let handle: SerializableHandle = self.dom.document.clone().into();
        let opts = SerializeOpts {
            traversal_scope: TraversalScope::ChildrenOnly(None),
            ..Default::default()
        };
        serialize(&mut bytes, &handle, opts).context("Failed to serialize document")?;
        String::from_utf8(bytes).context("Serialized document is not valid UTF-8")
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_serialize() {
        let document = Document::parse("<!DOCTYPE html><html class=\"dark\"><body><p>Hi &amp; bye</p></body></html>");
        let html = document.to_html().unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<p>Hi &amp; bye</p>"));
        assert_eq!(document.text_content(), "Hi & bye");
        assert!(node::has_class(&document.document_element().unwrap(), "dark"));
    }

    #[test]
    fn test_fragments_get_a_body() {
        let document = Document::parse("just text");
        let body = document.body().unwrap();
        assert_eq!(node::text_content(&body, &|_| false), "just text");
    }
}
