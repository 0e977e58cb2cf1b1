//! Reduce HTML feed fragments to plain text.

use scraper::Html;

/// Strip markup from an HTML fragment and collapse whitespace.
///
/// Feed summaries are usually HTML; the terminal only shows text.
pub fn html_to_text(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return collapse_whitespace(html);
    }

    let fragment = Html::parse_fragment(html);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&text)
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
