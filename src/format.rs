//! Text to markup conversion for the chat thread.
//!
//! User input goes through [`escape`] before it is stored or shown. Replies from the
//! webhook are trusted and go through [`render_markup`] without escaping.

use once_cell::sync::Lazy;
use regex::Regex;

struct Substitution {
    pattern: Lazy<Regex>,
    replacement: &'static str,
}

macro_rules! substitution {
    ($pattern:expr, $replacement:expr) => {
        Substitution {
            pattern: Lazy::new(|| Regex::new($pattern).expect("static markup pattern")),
            replacement: $replacement,
        }
    };
}

// Applied in order, each over the whole string. Bold must run before italic.
static SUBSTITUTIONS: [Substitution; 6] = [
    substitution!(r"\*\*(.*?)\*\*", "<strong>${1}</strong>"),
    substitution!(r"__(.*?)__", "<strong>${1}</strong>"),
    substitution!(r"\*(.*?)\*", "<em>${1}</em>"),
    substitution!(r"_(.*?)_", "<em>${1}</em>"),
    substitution!(r"`(.*?)`", "<code>${1}</code>"),
    substitution!(r"\n", "<br>"),
];

/// Replaces every `&`, `<`, `>` and `"` with its entity.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Lightweight markdown: bold, italic, inline code, then line breaks. No nesting.
pub fn render_markup(text: &str) -> String {
    SUBSTITUTIONS.iter().fold(text.to_string(), |acc, sub| {
        sub.pattern.replace_all(&acc, sub.replacement).into_owned()
    })
}
