use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dom::{Handle, node};

/// Identifier shared by a highlight region and its comment thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HighlightId(String);

impl HighlightId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HighlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HighlightId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A wrapped selection living in the document.
#[derive(Debug, Clone)]
pub struct HighlightRegion {
    id: HighlightId,
    element: Handle,
}

impl HighlightRegion {
    pub(crate) fn new(id: HighlightId, element: Handle) -> Self {
        Self { id, element }
    }

    pub fn id(&self) -> &HighlightId {
        &self.id
    }

    pub fn element(&self) -> &Handle {
        &self.element
    }
}

/// Millisecond clock that never repeats a value.
pub(crate) fn monotonic_millis(last: &mut i64, now: DateTime<Utc>) -> i64 {
    let millis = now.timestamp_millis().max(*last + 1);
    *last = millis;
    millis
}

#[derive(Debug, Default)]
pub struct IdGenerator {
    last: i64,
}

impl IdGenerator {
    pub fn next_id(&mut self) -> HighlightId {
        self.next_at(Utc::now())
    }

    pub fn next_at(&mut self, now: DateTime<Utc>) -> HighlightId {
        HighlightId(format!("highlight-{}", monotonic_millis(&mut self.last, now)))
    }
}

pub const COUNT_ATTRIBUTE: &str = "data-comment-count";

/// Markup used for highlight wrappers and their comment-count badges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightStyle {
    pub class_name: String,
    pub id_attribute: String,
    pub indicator_class: String,
    pub background: String,
    pub border: String,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            class_name: "gpt-comment-highlight".to_string(),
            id_attribute: "data-highlight-id".to_string(),
            indicator_class: "comment-indicator".to_string(),
            background: "rgba(255, 212, 0, 0.3)".to_string(),
            border: "rgba(255, 193, 7, 0.5)".to_string(),
        }
    }
}

impl HighlightStyle {
    pub fn build_wrapper(&self, id: &HighlightId) -> Handle {
        let css = format!(
            "background-color: {}; cursor: pointer; position: relative; \
             border-bottom: 2px solid {}; display: inline;",
            self.background, self.border
        );
        node::create_element(
            "span",
            &[
                ("class", self.class_name.as_str()),
                (self.id_attribute.as_str(), id.as_str()),
                ("style", css.as_str()),
            ],
        )
    }

    pub fn build_indicator(&self) -> Handle {
        let css = Self::indicator_css(false);
        node::create_element(
            "span",
            &[
                ("class", self.indicator_class.as_str()),
                (COUNT_ATTRIBUTE, "0"),
                ("style", css.as_str()),
            ],
        )
    }

    pub fn indicator_css(visible: bool) -> String {
        let display = if visible { "block" } else { "none" };
        format!(
            "position: absolute; top: -8px; right: -8px; width: 16px; height: 16px; \
             background: #ffc107; border-radius: 50%; display: {display}; font-size: 10px; \
             color: white; text-align: center; line-height: 16px; font-weight: bold; \
             pointer-events: none;"
        )
    }
}
