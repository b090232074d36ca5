//! Visible-text extraction and normalization.

use std::sync::LazyLock;

use scraper::{Html, Selector};

static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("static selector"));

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Extract the text a reader would see in `<body>`.
///
/// Text nodes are concatenated in document order without separators, so
/// block boundaries only produce whitespace where the markup has some.
pub fn extract_visible_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let root = doc
        .select(&BODY_SEL)
        .next()
        .unwrap_or_else(|| doc.root_element());

    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        out.push_str(text);
    }
    out
}

/// Lowercase and collapse every whitespace run to a single space.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for word in raw.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&word.to_lowercase());
    }
    out
}
