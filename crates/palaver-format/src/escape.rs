//! HTML escaping for untrusted text

use regex::Regex;
use std::sync::LazyLock;

/// A complete character or named entity reference at the start of a string.
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]{1,31}|#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6});")
        .expect("entity pattern is valid")
});

/// Escape `& < > " '` so the text is inert inside markup.
///
/// Existing entity references are kept as they are, which makes escaping
/// idempotent: `escape_html(&escape_html(s)) == escape_html(s)`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        match c {
            '&' if ENTITY.is_match(&text[i..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes_markup() {
        assert_eq!(
            escape_html(r#"<img src="x" onerror='alert(1)'>"#),
            "&lt;img src=&quot;x&quot; onerror=&#39;alert(1)&#39;&gt;"
        );
    }

    #[test]
    fn test_bare_ampersand() {
        assert_eq!(escape_html("Tom & Jerry"), "Tom &amp; Jerry");
        assert_eq!(escape_html("a&b"), "a&amp;b");
        assert_eq!(escape_html("&;"), "&amp;;");
    }

    #[test]
    fn test_existing_entities_preserved() {
        assert_eq!(escape_html("&amp; &lt; &#39; &#x1F600;"), "&amp; &lt; &#39; &#x1F600;");
    }

    #[test]
    fn test_idempotent() {
        for s in ["<b>bold</b> & \"quoted\"", "plain", "", "5 > 3 && 2 < 4", "it's"] {
            let once = escape_html(s);
            assert_eq!(escape_html(&once), once);
        }
    }

    #[test]
    fn test_multibyte_text() {
        assert_eq!(escape_html("café <ß> 日本"), "café &lt;ß&gt; 日本");
    }
}
