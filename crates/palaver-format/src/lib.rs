//! palaver-format: safe rendering of untrusted chat text
//!
//! Chat text is split into plain text, generic links and calendar-booking
//! links by a fixed sequence of rules. Only plain text is escaped; generated
//! markup is emitted as is.

pub mod error;
pub mod escape;
pub mod formatter;
pub mod transcript;

pub use error::{Error, Result};
pub use escape::escape_html;
pub use formatter::{BOOKING_LABEL, DEFAULT_BOOKING_PATTERN, MessageFormatter, Segment};
pub use transcript::render_html_transcript;
