//! Node-level helpers over `markup5ever_rcdom` handles.
//!
//! rcdom nodes keep a weak link to their parent and a `RefCell` list of
//! children. Every mutation here updates both sides so the two never disagree.
//!
//! Text offsets are counted in Unicode scalar values, never in bytes.

use std::cell::RefCell;
use std::rc::Rc;

use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Elements whose text never renders as selectable page content.
const NON_RENDERED_TAGS: &[&str] = &["head", "script", "style", "template", "noscript"];

pub fn parent(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|link| link.upgrade());
    node.parent.set(weak);
    parent
}

fn set_parent(node: &Handle, parent: Option<&Handle>) {
    node.parent.set(parent.map(Rc::downgrade));
}

pub fn index_in_parent(node: &Handle) -> Option<usize> {
    let parent = parent(node)?;
    let children = parent.children.borrow();
    children.iter().position(|child| Rc::ptr_eq(child, node))
}

pub fn children(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

pub fn child_at(node: &Handle, index: usize) -> Option<Handle> {
    node.children.borrow().get(index).cloned()
}

pub fn next_sibling(node: &Handle) -> Option<Handle> {
    let parent = parent(node)?;
    let index = index_in_parent(node)?;
    child_at(&parent, index + 1)
}

/// Topmost inclusive ancestor of `node`.
pub fn root_of(node: &Handle) -> Handle {
    let mut current = node.clone();
    while let Some(up) = parent(&current) {
        current = up;
    }
    current
}

/// Child indices leading from the root down to `node`.
///
/// Paths compare lexicographically in tree order: an ancestor's path is a
/// prefix of, and therefore sorts before, each of its descendants' paths.
pub fn path_from_root(node: &Handle) -> Vec<usize> {
    let mut path = Vec::new();
    let mut current = node.clone();
    while let Some(up) = parent(&current) {
        let index = up
            .children
            .borrow()
            .iter()
            .position(|child| Rc::ptr_eq(child, &current))
            .unwrap_or(0);
        path.push(index);
        current = up;
    }
    path.reverse();
    path
}

pub fn is_inclusive_ancestor(ancestor: &Handle, node: &Handle) -> bool {
    let mut current = Some(node.clone());
    while let Some(candidate) = current {
        if Rc::ptr_eq(&candidate, ancestor) {
            return true;
        }
        current = parent(&candidate);
    }
    false
}

pub fn is_text(node: &Handle) -> bool {
    matches!(node.data, NodeData::Text { .. })
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

pub fn is_doctype(node: &Handle) -> bool {
    matches!(node.data, NodeData::Doctype { .. })
}

/// Element or document: the node kinds that can hold children.
pub fn is_container(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. } | NodeData::Document)
}

pub fn tag_name(node: &Node) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(&name.local),
        _ => None,
    }
}

pub fn is_non_rendered(node: &Handle) -> bool {
    tag_name(node).is_some_and(|tag| NON_RENDERED_TAGS.contains(&tag))
}

/// DOM node length: characters for text, child count for containers.
pub fn node_length(node: &Handle) -> usize {
    match &node.data {
        NodeData::Text { contents } => contents.borrow().chars().count(),
        NodeData::Comment { contents } => contents.chars().count(),
        NodeData::Element { .. } | NodeData::Document => node.children.borrow().len(),
        _ => 0,
    }
}

pub fn text_data(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some((**contents.borrow()).to_owned()),
        _ => None,
    }
}

pub fn set_text_data(node: &Handle, value: &str) {
    if let NodeData::Text { contents } = &node.data {
        *contents.borrow_mut() = StrTendril::from_slice(value);
    }
}

pub fn create_text(value: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(value)),
    })
}

pub fn create_element(tag: &str, attributes: &[(&str, &str)]) -> Handle {
    let attrs = attributes
        .iter()
        .map(|(name, value)| Attribute {
            name: attribute_name(name),
            value: StrTendril::from_slice(value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// Parentless container used to carry extracted content around.
pub fn create_fragment() -> Handle {
    Node::new(NodeData::Document)
}

fn attribute_name(name: &str) -> QualName {
    QualName::new(None, Namespace::from(""), LocalName::from(name))
}

/// Copies a node without its children.
pub fn shallow_clone(node: &Handle) -> Handle {
    let data = match &node.data {
        NodeData::Element {
            name,
            attrs,
            mathml_annotation_xml_integration_point,
            ..
        } => NodeData::Element {
            name: name.clone(),
            attrs: RefCell::new(attrs.borrow().clone()),
            template_contents: RefCell::new(None),
            mathml_annotation_xml_integration_point: *mathml_annotation_xml_integration_point,
        },
        NodeData::Text { contents } => NodeData::Text {
            contents: RefCell::new(contents.borrow().clone()),
        },
        NodeData::Comment { contents } => NodeData::Comment {
            contents: contents.clone(),
        },
        NodeData::Doctype {
            name,
            public_id,
            system_id,
        } => NodeData::Doctype {
            name: name.clone(),
            public_id: public_id.clone(),
            system_id: system_id.clone(),
        },
        NodeData::ProcessingInstruction { target, contents } => {
            NodeData::ProcessingInstruction {
                target: target.clone(),
                contents: contents.clone(),
            }
        }
        NodeData::Document => NodeData::Document,
    };
    Node::new(data)
}

/// Detaches `node` from its parent, if it has one.
pub fn remove(node: &Handle) {
    if let Some(parent) = parent(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    set_parent(node, None);
}

/// Inserts `child` into `parent` before `reference`, or last when there is no
/// reference. The child is detached from any previous parent first.
pub fn insert_before(parent: &Handle, child: &Handle, reference: Option<&Handle>) {
    remove(child);
    {
        let mut children = parent.children.borrow_mut();
        let index = reference
            .and_then(|reference| children.iter().position(|c| Rc::ptr_eq(c, reference)))
            .unwrap_or(children.len());
        children.insert(index, child.clone());
    }
    set_parent(child, Some(parent));
}

pub fn append_child(parent: &Handle, child: &Handle) {
    insert_before(parent, child, None);
}

/// Puts `replacement` where `old` was. Returns false when `old` is detached.
pub fn replace(old: &Handle, replacement: &Handle) -> bool {
    let Some(parent) = parent(old) else {
        return false;
    };
    insert_before(&parent, replacement, Some(old));
    remove(old);
    true
}

/// Moves every child of `from` to the end of `to`, keeping their order.
pub fn move_children(from: &Handle, to: &Handle) {
    let moved = std::mem::take(&mut *from.children.borrow_mut());
    for child in &moved {
        set_parent(child, None);
        append_child(to, child);
    }
}

/// Replaces all children of `node` with a single text node.
pub fn set_text_content(node: &Handle, value: &str) {
    let old = std::mem::take(&mut *node.children.borrow_mut());
    for child in &old {
        set_parent(child, None);
    }
    if !value.is_empty() {
        append_child(node, &create_text(value));
    }
}

/// Splits a text node at `offset`; the tail becomes a new next sibling.
///
/// Returns the new node, or `None` (without mutating) when `node` is not an
/// attached text node.
pub fn split_text(node: &Handle, offset: usize) -> Option<Handle> {
    let data = text_data(node)?;
    let parent = parent(node)?;
    let reference = next_sibling(node);

    let split_at = byte_offset(&data, offset);
    set_text_data(node, &data[..split_at]);
    let tail = create_text(&data[split_at..]);
    insert_before(&parent, &tail, reference.as_ref());
    Some(tail)
}

pub fn attribute(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == name)
            .map(|attr| String::from(&*attr.value)),
        _ => None,
    }
}

pub fn set_attribute(node: &Handle, name: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|attr| &*attr.name.local == name) {
            Some(attr) => attr.value = StrTendril::from_slice(value),
            None => attrs.push(Attribute {
                name: attribute_name(name),
                value: StrTendril::from_slice(value),
            }),
        }
    }
}

pub fn has_class(node: &Handle, class: &str) -> bool {
    attribute(node, "class")
        .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
}

/// Inclusive descendants of `node` in tree order.
pub fn descendants(node: &Handle) -> Vec<Handle> {
    let mut out = Vec::new();
    let mut stack = vec![node.clone()];
    while let Some(current) = stack.pop() {
        stack.extend(current.children.borrow().iter().rev().cloned());
        out.push(current);
    }
    out
}

/// Concatenated text under `node`, not descending into nodes for which
/// `skip` returns true.
pub fn text_content(node: &Handle, skip: &dyn Fn(&Handle) -> bool) -> String {
    let mut out = String::new();
    let mut stack = vec![node.clone()];
    while let Some(current) = stack.pop() {
        if skip(&current) {
            continue;
        }
        if let NodeData::Text { contents } = &current.data {
            out.push_str(&contents.borrow());
            continue;
        }
        stack.extend(current.children.borrow().iter().rev().cloned());
    }
    out
}

/// Byte index of the `chars`-th character, clamped to the string length.
pub fn byte_offset(value: &str, chars: usize) -> usize {
    value
        .char_indices()
        .nth(chars)
        .map(|(index, _)| index)
        .unwrap_or(value.len())
}

/// Substring by character offsets.
pub fn char_slice(value: &str, start: usize, end: usize) -> &str {
    let from = byte_offset(value, start);
    let to = byte_offset(value, end).max(from);
    &value[from..to]
}
