use iced::widget::text_editor;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::conversation::Role;
use crate::lifecycle::Presenter;

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"<br\s*/?>").expect("static pattern"));
static INLINE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?(strong|em|code)>").expect("static pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub role: Role,
    pub text: String,
}

/// Desktop-side state the lifecycle renders into.
pub struct ThreadView {
    rows: Vec<Row>,
    typing: bool,
    revealed: bool,
    scroll_pending: bool,
    input: text_editor::Content,
}

impl Default for ThreadView {
    fn default() -> Self {
        ThreadView {
            rows: Vec::new(),
            typing: false,
            revealed: false,
            scroll_pending: false,
            input: text_editor::Content::new(),
        }
    }
}

impl ThreadView {
    pub fn input(&self) -> &text_editor::Content {
        &self.input
    }

    /// Composer text as typed, newlines included.
    pub fn input_text(&self) -> String {
        self.input.text()
    }

    pub fn edit_input(&mut self, action: text_editor::Action) {
        self.input.perform(action);
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// False until the first send; the starter grid is shown while this is false.
    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    /// Returns and clears the pending scroll-to-bottom request.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_pending)
    }
}

impl Presenter for ThreadView {
    fn render_message(&mut self, role: Role, markup: &str) {
        self.rows.push(Row {
            role,
            text: markup_to_display(markup),
        });
        self.scroll_pending = true;
    }

    fn render_typing_indicator(&mut self) {
        self.typing = true;
        self.scroll_pending = true;
    }

    fn remove_typing_indicator(&mut self) {
        self.typing = false;
    }

    fn clear_input_field(&mut self) {
        self.input = text_editor::Content::new();
    }

    fn reveal_main_ui(&mut self) {
        self.revealed = true;
    }
}

/// iced draws plain text, so line breaks become newlines and inline tags are dropped.
pub fn markup_to_display(markup: &str) -> String {
    let text = LINE_BREAK.replace_all(markup, "\n");
    let text = INLINE_TAG.replace_all(&text, "");
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}
