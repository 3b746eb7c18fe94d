//! Text cleanup applied to every extracted title and body.
//!
//! Both fetch strategies run their output through [`normalize_text`] so an
//! [`Article`](crate::models::Article) always carries plain single-spaced text.

use scraper::{ElementRef, Html, Node};

/// Strip markup, replace control characters and collapse whitespace.
///
/// # Examples
///
/// ```
/// use mediekompas::normalize::normalize_text;
/// assert_eq!(normalize_text("<p>Hej\n\tverden</p>"), "Hej verden");
/// ```
pub fn normalize_text(raw: &str) -> String {
    let text = if raw.contains('<') {
        strip_tags(raw)
    } else {
        raw.to_string()
    };

    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized text content of an element and its descendants.
///
/// Inline markup joins without a gap (`skatte<b>lettelser</b>` reads
/// `skattelettelser`); block elements and `<br>` separate words.
pub fn element_text(element: &ElementRef<'_>) -> String {
    let mut text = String::new();
    collect_text(*element, &mut text);
    normalize_text(&text)
}

fn strip_tags(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let mut text = String::new();
    collect_text(fragment.root_element(), &mut text);
    text
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child) = ElementRef::wrap(child) {
            let name = child.value().name();
            if SKIPPED.contains(&name) {
                continue;
            }
            let block = BLOCKS.contains(&name);
            if block {
                out.push(' ');
            }
            collect_text(child, out);
            if block {
                out.push(' ');
            }
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
        }
    }
}

const SKIPPED: &[&str] = &["script", "style", "noscript", "template"];

const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre",
    "section", "table", "td", "th", "title", "tr", "ul",
];
