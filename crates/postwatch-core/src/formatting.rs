//! SMS alert formatting.

use crate::domain::Post;

pub const DEFAULT_ALERT_HEADER: &str = "NEW POST ALERT";

/// Concatenated-SMS ceiling most carriers accept (10 segments).
pub const DEFAULT_MAX_SMS_LENGTH: usize = 1600;

/// Smallest accepted length limit: one single-part SMS.
pub const MIN_SMS_LENGTH: usize = 160;

const ELLIPSIS: &str = "...";

// Time line, blank lines, ellipsis and a permalink for the longest handle (15)
// and post id (19) the feed hands out.
const LAYOUT_CHARS: usize = 102;

// Post text that must survive truncation.
const MIN_TEXT_CHARS: usize = 20;

/// Fixed alert layout: header, timestamp, post text, permalink.
#[derive(Clone, Debug)]
pub struct AlertTemplate {
    pub header: String,
    pub max_len: usize,
}

impl Default for AlertTemplate {
    fn default() -> Self {
        Self {
            header: DEFAULT_ALERT_HEADER.to_string(),
            max_len: DEFAULT_MAX_SMS_LENGTH,
        }
    }
}

impl AlertTemplate {
    /// Smallest `max_len` that keeps the header, the link and some post text.
    pub fn min_len(&self) -> usize {
        (self.header.chars().count() + LAYOUT_CHARS + MIN_TEXT_CHARS).max(MIN_SMS_LENGTH)
    }

    /// Render the SMS body for `post`.
    ///
    /// Only the post text is shortened when the body is over `max_len` characters; the
    /// header and link always survive.
    pub fn render(&self, handle: &str, post: &Post) -> String {
        let full = self.compose(handle, post, &post.text);
        let total = full.chars().count();
        if total <= self.max_len {
            return full;
        }

        let text_len = post.text.chars().count();
        let overhead = total - text_len;
        let budget = self
            .max_len
            .saturating_sub(overhead)
            .saturating_sub(ELLIPSIS.len());
        if budget == 0 {
            // Header alone is over the limit; fall back to a hard cut.
            return truncate_text(&full, self.max_len.saturating_sub(ELLIPSIS.len()));
        }

        let text = truncate_text(&post.text, budget);
        self.compose(handle, post, &text)
    }

    fn compose(&self, handle: &str, post: &Post, text: &str) -> String {
        let created = post.created_at.format("%m/%d/%y %I:%M%p UTC");
        [
            self.header.clone(),
            format!("Time: {created}"),
            String::new(),
            text.to_string(),
            String::new(),
            format!("Link: {}", post_url(handle, post)),
        ]
        .join("\n")
    }
}

pub fn post_url(handle: &str, post: &Post) -> String {
    format!("https://twitter.com/{handle}/status/{}", post.id)
}

/// Cut `s` to at most `max_chars` characters and mark the cut with `...`.
pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str(ELLIPSIS);
    out
}
