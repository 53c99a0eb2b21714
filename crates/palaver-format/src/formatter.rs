//! Text to markup pipeline for chat messages.
//!
//! Message text is untrusted: it can echo user input or come straight from
//! the vendor's agent. The text is first split into segments by a fixed,
//! ordered set of rules, and only plain-text segments are ever escaped, so
//! generated markup is never escaped and escaped text is never re-linked.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

use crate::error::Result;
use crate::escape::escape_html;

/// Calendly and Cal.com scheduling pages
pub const DEFAULT_BOOKING_PATTERN: &str =
    r#"(?i)https?://(?:www\.)?(?:calendly\.com|cal\.com)/[^\s<>"']+"#;

/// Label of the action element that replaces a booking link
pub const BOOKING_LABEL: &str = "Open calendar";

static GENERIC_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:https?://|www\.)[^\s<>"']+"#).expect("URL pattern is valid")
});

/// A piece of formatted message text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Plain text, still unescaped
    Text(String),
    /// A generic web link; `url` is the text as written, `href` the target
    Link { url: String, href: String },
    /// A calendar booking link, shown as an action rather than inline
    Booking { url: String },
}

/// Recognized content kinds, applied in declaration order.
///
/// Booking links must be claimed before generic links, otherwise the
/// generic rule would turn them into ordinary anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    BookingLink,
    GenericLink,
}

const RULES: [Rule; 2] = [Rule::BookingLink, Rule::GenericLink];

/// Renders chat text as safe HTML
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    booking: Regex,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFormatter {
    pub fn new() -> Self {
        Self {
            booking: Regex::new(DEFAULT_BOOKING_PATTERN).expect("booking pattern is valid"),
        }
    }

    /// Use a custom booking-link pattern
    pub fn with_booking_pattern(pattern: &str) -> Result<Self> {
        Ok(Self {
            booking: Regex::new(pattern)?,
        })
    }

    /// Split text into plain, link and booking segments
    pub fn segments(&self, text: &str) -> Vec<Segment> {
        let mut segments = vec![Segment::Text(text.to_string())];
        for rule in RULES {
            segments = segments
                .into_iter()
                .flat_map(|segment| match segment {
                    Segment::Text(text) => self.apply(rule, &text),
                    other => vec![other],
                })
                .collect();
        }
        segments
    }

    /// Render text as HTML
    pub fn format(&self, text: &str) -> String {
        self.segments(text).iter().map(render_html).collect()
    }

    /// Run one rule over a plain-text segment
    fn apply(&self, rule: Rule, text: &str) -> Vec<Segment> {
        let pattern = match rule {
            Rule::BookingLink => &self.booking,
            Rule::GenericLink => &*GENERIC_URL,
        };

        let mut segments = Vec::new();
        let mut last = 0;
        for Range { start, end } in find_links(pattern, text) {
            if start > last {
                segments.push(Segment::Text(text[last..start].to_string()));
            }
            let url = text[start..end].to_string();
            segments.push(match rule {
                Rule::BookingLink => Segment::Booking { url },
                Rule::GenericLink => {
                    let href = if url.to_ascii_lowercase().starts_with("www.") {
                        format!("https://{}", url)
                    } else {
                        url.clone()
                    };
                    Segment::Link { url, href }
                }
            });
            last = end;
        }
        if last < text.len() {
            segments.push(Segment::Text(text[last..].to_string()));
        }
        segments
    }
}

/// Match ranges of `pattern` with trailing sentence punctuation removed
fn find_links(pattern: &Regex, text: &str) -> Vec<Range<usize>> {
    pattern
        .find_iter(text)
        .filter_map(|m| {
            let trimmed = trim_trailing_punctuation(m.as_str());
            if trimmed.is_empty() {
                None
            } else {
                Some(m.start()..m.start() + trimmed.len())
            }
        })
        .collect()
}

/// Drop punctuation that usually ends a sentence rather than a URL.
/// A closing parenthesis is kept when it balances one inside the URL.
fn trim_trailing_punctuation(url: &str) -> &str {
    let mut url = url;
    loop {
        let Some(last) = url.chars().last() else {
            return url;
        };
        let strip = match last {
            '.' | ',' | ';' | ':' | '!' | '?' => true,
            ')' => url.matches(')').count() > url.matches('(').count(),
            _ => false,
        };
        if !strip {
            return url;
        }
        url = &url[..url.len() - last.len_utf8()];
    }
}

fn render_html(segment: &Segment) -> String {
    match segment {
        Segment::Text(text) => escape_html(text),
        Segment::Link { url, href } => format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            escape_html(href),
            escape_html(url)
        ),
        Segment::Booking { url } => format!(
            r#"<a class="calendar-button" href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            escape_html(url),
            BOOKING_LABEL
        ),
    }
}
