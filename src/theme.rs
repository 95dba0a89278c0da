use crate::dom::{Document, node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageTheme {
    #[default]
    Light,
    Dark,
}

impl PageTheme {
    /// Dark when the root element has a `dark` class or declares
    /// `color-scheme: dark` inline.
    pub fn detect(document: &Document) -> Self {
        let Some(root) = document.document_element() else {
            return PageTheme::Light;
        };
        let dark_class = node::has_class(&root, "dark");
        let dark_scheme = node::attribute(&root, "style").is_some_and(|style| declares_dark_scheme(&style));
        if dark_class || dark_scheme {
            PageTheme::Dark
        } else {
            PageTheme::Light
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageTheme::Light => "light",
            PageTheme::Dark => "dark",
        }
    }
}

fn declares_dark_scheme(style: &str) -> bool {
    style
        .split(';')
        .filter_map(|declaration| declaration.split_once(':'))
        .any(|(property, value)| {
            property.trim().eq_ignore_ascii_case("color-scheme")
                && value.trim().eq_ignore_ascii_case("dark")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_dark_class() {
        let document = Document::parse("<html class=\"theme dark\"><body>x</body></html>");
        assert_eq!(PageTheme::detect(&document), PageTheme::Dark);
    }

    #[test]
    fn test_detects_inline_color_scheme() {
        let document =
            Document::parse("<html style=\"font-size: 14px; Color-Scheme: dark\"><body>x</body></html>");
        assert_eq!(PageTheme::detect(&document), PageTheme::Dark);
    }

    #[test]
    fn test_light_by_default() {
        let document = Document::parse("<html class=\"darker\" style=\"color-scheme: light dark\"><body>x</body></html>");
        assert_eq!(PageTheme::detect(&document), PageTheme::Light);
        assert_eq!(PageTheme::detect(&document).as_str(), "light");
    }
}
