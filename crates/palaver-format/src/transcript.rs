//! Standalone HTML transcript export

use chrono::{DateTime, Local};
use palaver_session::{Message, Role};

use crate::escape::escape_html;
use crate::formatter::MessageFormatter;

const STYLE: &str = "\
body { font-family: system-ui, sans-serif; max-width: 720px; margin: 2rem auto; color: #1f2328; }
h1 { font-size: 1.25rem; }
.message { margin: 0.75rem 0; padding: 0.6rem 0.9rem; border-radius: 10px; white-space: pre-wrap; }
.message.user { background: #dbeafe; margin-left: 20%; }
.message.agent { background: #f3f4f6; margin-right: 20%; }
.meta { font-size: 0.75rem; color: #6b7280; margin-bottom: 0.25rem; }
.calendar-button { display: inline-block; padding: 0.3rem 0.8rem; border-radius: 6px; background: #2563eb; color: #fff; text-decoration: none; }
";

/// Render a conversation as a complete HTML page using the default formatter
pub fn render_html_transcript(title: &str, messages: &[Message]) -> String {
    MessageFormatter::new().render_transcript(title, messages)
}

impl MessageFormatter {
    /// Render a conversation as a complete HTML page
    pub fn render_transcript(&self, title: &str, messages: &[Message]) -> String {
        let title = escape_html(title);
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str(&format!("<title>{}</title>\n<style>\n{}</style>\n", title, STYLE));
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!("<h1>{}</h1>\n", title));

        if messages.is_empty() {
            html.push_str("<p class=\"meta\">No messages.</p>\n");
        }
        for message in messages {
            let speaker = match message.role {
                Role::User => "You",
                Role::Agent => "Agent",
            };
            html.push_str(&format!(
                "<div class=\"message {}\">\n<div class=\"meta\">{} &middot; {}</div>\n{}\n</div>\n",
                message.role.as_str(),
                speaker,
                format_timestamp(message.timestamp),
                self.format(&message.content)
            ));
        }

        html.push_str("</body>\n</html>\n");
        html
    }
}

fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_structure() {
        let messages = vec![
            Message::user("Can I book a demo?"),
            Message::agent("Sure: https://calendly.com/acme/demo"),
        ];
        let html = render_html_transcript("Chat <1>", &messages);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Chat &lt;1&gt;</title>"));
        assert!(html.contains("<div class=\"message user\">"));
        assert!(html.contains("<div class=\"message agent\">"));
        assert!(html.contains("class=\"calendar-button\" href=\"https://calendly.com/acme/demo\""));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn test_transcript_escapes_message_content() {
        let html = render_html_transcript("t", &[Message::user("<script>alert(1)</script>")]);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    }

    #[test]
    fn test_empty_transcript() {
        let html = render_html_transcript("empty", &[]);
        assert!(html.contains("No messages."));
    }

    #[test]
    fn test_message_order_is_kept() {
        let messages = vec![Message::user("first"), Message::agent("second")];
        let html = render_html_transcript("t", &messages);
        let first = html.find("first").unwrap();
        let second = html.find("second").unwrap();
        assert!(first < second);
    }
}
