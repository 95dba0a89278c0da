//! Placement of the floating comment trigger and the thread editor.
//!
//! Geometry comes from a [`LayoutProbe`], since the document model itself has
//! no layout. Probe rects are viewport-relative; results are page coordinates.

use crate::dom::{Document, Handle, node};

pub const EDITOR_WIDTH: f64 = 320.0;
const EDGE_GAP: f64 = 20.0;
const TRIGGER_GAP: f64 = 10.0;
const TRIGGER_SIZE: f64 = 32.0;
const MIN_CONTENT_WIDTH: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

/// Viewport-relative bounding boxes for rendered elements.
pub trait LayoutProbe {
    fn bounding_rect(&self, element: &Handle) -> Option<Rect>;
}

enum ContentSelector {
    Attribute(&'static str, &'static str),
    Tag(&'static str),
    Class(&'static str),
}

impl ContentSelector {
    fn matches(&self, candidate: &Handle) -> bool {
        match self {
            ContentSelector::Attribute(name, value) => {
                node::attribute(candidate, name).as_deref() == Some(*value)
            }
            ContentSelector::Tag(tag) => node::tag_name(candidate) == Some(*tag),
            ContentSelector::Class(class) => node::has_class(candidate, class),
        }
    }
}

/// Elements that usually frame the main text column of a chat page, most
/// specific first.
const CONTENT_SELECTORS: &[ContentSelector] = &[
    ContentSelector::Attribute("data-testid", "conversation-turn-"),
    ContentSelector::Class("prose"),
    ContentSelector::Tag("article"),
    ContentSelector::Attribute("role", "main"),
    ContentSelector::Class("max-w-3xl"),
    ContentSelector::Class("max-w-4xl"),
    ContentSelector::Class("mx-auto"),
];

/// Right edge of the main content column, in page coordinates.
///
/// The first selector with an element wider than `MIN_CONTENT_WIDTH` decides,
/// using the rightmost such element. Without one, a fraction of the viewport
/// width is used.
pub fn content_right_boundary(document: &Document, probe: &dyn LayoutProbe, viewport: &Viewport) -> f64 {
    for selector in CONTENT_SELECTORS {
        let rightmost = document
            .find_all(|candidate| selector.matches(candidate))
            .iter()
            .filter_map(|element| probe.bounding_rect(element))
            .filter(|rect| rect.width > MIN_CONTENT_WIDTH)
            .map(|rect| rect.right())
            .fold(0.0_f64, f64::max);
        if rightmost > 0.0 {
            return rightmost + viewport.scroll_x;
        }
    }

    let fraction = if viewport.width > 1200.0 {
        0.7
    } else if viewport.width > 768.0 {
        0.8
    } else {
        0.9
    };
    viewport.width * fraction
}

/// Where the comment trigger sits for a selection: just right of the
/// content column, level with the selection's top edge.
pub fn trigger_position(
    selection: &Rect,
    document: &Document,
    probe: &dyn LayoutProbe,
    viewport: &Viewport,
) -> Rect {
    Rect {
        left: content_right_boundary(document, probe, viewport) + TRIGGER_GAP,
        top: selection.top + viewport.scroll_y,
        width: TRIGGER_SIZE,
        height: TRIGGER_SIZE,
    }
}

/// Top-left corner of the editor opened from the trigger at `trigger`
/// (viewport-relative).
///
/// The editor drops below the trigger and is right-aligned with it when it
/// would otherwise overflow the viewport.
pub fn editor_position(trigger: &Rect, viewport: &Viewport) -> (f64, f64) {
    let y = trigger.bottom() + viewport.scroll_y + 5.0;
    let x = if trigger.left > viewport.width - EDITOR_WIDTH - EDGE_GAP {
        trigger.right() + viewport.scroll_x - EDITOR_WIDTH
    } else {
        trigger.left + viewport.scroll_x
    };
    (x, y)
}

/// Top-left corner of the editor reopened by clicking the highlight at
/// `region` (viewport-relative): under the highlight, kept inside the
/// content column.
pub fn reopened_editor_position(
    region: &Rect,
    document: &Document,
    probe: &dyn LayoutProbe,
    viewport: &Viewport,
) -> (f64, f64) {
    let boundary = content_right_boundary(document, probe, viewport);
    let x = (boundary - EDITOR_WIDTH).min(region.left + viewport.scroll_x);
    (x, region.bottom() + viewport.scroll_y + 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedLayout {
        by_tag: HashMap<&'static str, Rect>,
    }

    impl LayoutProbe for FixedLayout {
        fn bounding_rect(&self, element: &Handle) -> Option<Rect> {
            node::tag_name(element).and_then(|tag| self.by_tag.get(tag).copied())
        }
    }

    fn viewport(width: f64) -> Viewport {
        Viewport {
            width,
            height: 800.0,
            scroll_x: 0.0,
            scroll_y: 100.0,
        }
    }

    fn rect(left: f64, width: f64) -> Rect {
        Rect {
            left,
            top: 40.0,
            width,
            height: 20.0,
        }
    }

    #[test]
    fn test_earlier_selector_wins_over_wider_later_one() {
        let document = Document::parse(
            "<main role=\"main\"><article>a</article><section class=\"prose\">b</section></main>",
        );
        let probe = FixedLayout {
            by_tag: HashMap::from([
                ("main", rect(0.0, 1100.0)),
                ("article", rect(100.0, 700.0)),
                ("section", rect(100.0, 500.0)),
            ]),
        };
        assert_eq!(content_right_boundary(&document, &probe, &viewport(1400.0)), 600.0);
    }

    #[test]
    fn test_narrow_matches_fall_through_to_next_selector() {
        let document = Document::parse(
            "<main role=\"main\"><section class=\"prose\">b</section></main>",
        );
        let probe = FixedLayout {
            by_tag: HashMap::from([("main", rect(0.0, 900.0)), ("section", rect(0.0, 200.0))]),
        };
        assert_eq!(content_right_boundary(&document, &probe, &viewport(1400.0)), 900.0);
    }

    #[test]
    fn test_no_content_falls_back_to_viewport_fraction() {
        let document = Document::parse("<article>a</article>");
        let probe = FixedLayout {
            by_tag: HashMap::from([("article", rect(0.0, 250.0))]),
        };
        let close = |width: f64, expected: f64| {
            (content_right_boundary(&document, &probe, &viewport(width)) - expected).abs() < 1e-6
        };
        assert!(close(1400.0, 980.0));
        assert!(close(1000.0, 800.0));
        assert!(close(500.0, 450.0));
    }

    #[test]
    fn test_trigger_sits_right_of_content() {
        let document = Document::parse("<article>a</article>");
        let probe = FixedLayout {
            by_tag: HashMap::from([("article", rect(0.0, 600.0))]),
        };
        let trigger = trigger_position(&rect(50.0, 80.0), &document, &probe, &viewport(1400.0));
        assert_eq!(trigger.left, 610.0);
        assert_eq!(trigger.top, 140.0);
    }

    #[test]
    fn test_editor_flips_near_right_edge() {
        let near_edge = Rect {
            left: 900.0,
            top: 10.0,
            width: 32.0,
            height: 32.0,
        };
        assert_eq!(editor_position(&near_edge, &viewport(1000.0)), (612.0, 147.0));

        let roomy = Rect {
            left: 100.0,
            ..near_edge
        };
        assert_eq!(editor_position(&roomy, &viewport(1000.0)), (100.0, 147.0));
    }

    #[test]
    fn test_reopened_editor_stays_inside_content() {
        let document = Document::parse("<article>a</article>");
        let probe = FixedLayout {
            by_tag: HashMap::from([("article", rect(0.0, 600.0))]),
        };
        let far_right = rect(500.0, 80.0);
        assert_eq!(
            reopened_editor_position(&far_right, &document, &probe, &viewport(1400.0)),
            (280.0, 170.0)
        );
        let left_side = rect(40.0, 80.0);
        assert_eq!(
            reopened_editor_position(&left_side, &document, &probe, &viewport(1400.0)),
            (40.0, 170.0)
        );
    }
}
