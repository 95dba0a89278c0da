use std::collections::HashSet;
use std::rc::Rc;

use html5ever::tendril::StrTendril;
use markup5ever_rcdom::{Handle, Node, NodeData};

use super::node;

struct Entry {
    node: Handle,
    children: Vec<Handle>,
    text: Option<StrTendril>,
}

/// Snapshot of a subtree's structure and text, used to undo a failed edit.
pub struct Checkpoint {
    entries: Vec<Entry>,
}

impl Checkpoint {
    pub fn capture(root: &Handle) -> Self {
        let entries = node::descendants(root)
            .into_iter()
            .map(|node| {
                let children = node.children.borrow().clone();
                let text = match &node.data {
                    NodeData::Text { contents } => Some(contents.borrow().clone()),
                    _ => None,
                };
                Entry {
                    node,
                    children,
                    text,
                }
            })
            .collect();
        Self { entries }
    }

    /// Puts the captured subtree back exactly as it was.
    ///
    /// `scratch` is a node built during the failed edit. Nodes created by the
    /// edit may still list captured nodes as children; those links are cut so
    /// that dropping the scratch tree cannot empty the restored nodes.
    pub fn rollback(self, scratch: &Handle) {
        let captured: HashSet<*const Node> =
            self.entries.iter().map(|entry| Rc::as_ptr(&entry.node)).collect();

        for entry in self.entries {
            if let (NodeData::Text { contents }, Some(text)) = (&entry.node.data, entry.text) {
                *contents.borrow_mut() = text;
            }
            for child in &entry.children {
                child.parent.set(Some(Rc::downgrade(&entry.node)));
            }
            *entry.node.children.borrow_mut() = entry.children;
        }

        let mut detached = Vec::new();
        let mut stack = vec![scratch.clone()];
        while let Some(current) = stack.pop() {
            if captured.contains(&Rc::as_ptr(&current)) {
                continue;
            }
            let children = std::mem::take(&mut *current.children.borrow_mut());
            stack.extend(children.iter().cloned());
            detached.extend(children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, Range};

    #[test]
    fn test_rollback_undoes_extraction() {
        let document = Document::parse("<p>one <b>two</b> three</p>");
        let before = document.to_html().unwrap();
        let body = document.body().unwrap();

        let checkpoint = Checkpoint::capture(&body);
        let mut range = Range::from_text_offsets(&body, 2, 10, &|_| false).unwrap();
        let fragment = range.extract_contents().unwrap();
        let scratch = node::create_element("span", &[]);
        node::move_children(&fragment, &scratch);
        assert_ne!(document.to_html().unwrap(), before);

        checkpoint.rollback(&scratch);
        drop(scratch);
        assert_eq!(document.to_html().unwrap(), before);
        assert_eq!(document.text_content(), "one two three");
    }
}
