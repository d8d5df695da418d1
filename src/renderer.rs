//! Streaming renderer for styled segments.
//!
//! The renderer tracks the active style and only writes an SGR sequence when a segment's style
//! differs from it, so a long code block streamed one character at a time costs one escape
//! sequence rather than one per character.

use crate::style::{StyledSegment, TextStyle};
use crate::terminal::Terminal;
use crate::theme::{Theme, RESET};

pub struct StyledRenderer<T: Terminal> {
    terminal: T,
    theme: Theme,
    color: bool,
    active: TextStyle,
    /// Whether the last visible character written ended a line.
    at_line_start: bool,
}

impl<T: Terminal> StyledRenderer<T> {
    pub fn new(terminal: T) -> Self {
        let color = terminal.supports_color();
        Self {
            terminal,
            theme: Theme::default(),
            color,
            active: TextStyle::Default,
            at_line_start: true,
        }
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    /// Forces plain output regardless of what the terminal reports.
    pub fn plain(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    pub fn render(&mut self, segments: &[StyledSegment]) {
        for segment in segments {
            self.render_segment(segment);
        }
        self.terminal.flush();
    }

    pub fn render_segment(&mut self, segment: &StyledSegment) {
        if segment.text.is_empty() {
            return;
        }
        self.switch_to(&segment.style);
        self.write_text(&segment.text);
    }

    /// Writes a complete status line in `style`, on a line of its own and ending reset.
    pub fn line(&mut self, text: &str, style: TextStyle) {
        if !self.at_line_start {
            self.reset();
            self.write_text("\n");
        }
        self.switch_to(&style);
        self.write_text(text);
        self.reset();
        if !text.ends_with('\n') {
            self.write_text("\n");
        }
        self.terminal.flush();
    }

    /// Writes `text` in the default style without a trailing newline.
    ///
    /// The user's input line is echoed by the terminal and ends with their newline, so output
    /// after a prompt starts on a fresh line.
    pub fn prompt(&mut self, text: &str) {
        self.reset();
        self.terminal.write(text);
        self.at_line_start = true;
        self.terminal.flush();
    }

    #[must_use]
    pub fn at_line_start(&self) -> bool {
        self.at_line_start
    }

    pub fn reset(&mut self) {
        if !self.active.is_default() {
            if self.color {
                self.terminal.write(RESET);
            }
            self.active = TextStyle::Default;
        }
    }

    fn write_text(&mut self, text: &str) {
        if let Some(last) = text.chars().last() {
            self.at_line_start = last == '\n';
        }
        self.terminal.write(text);
    }

    fn switch_to(&mut self, style: &TextStyle) {
        if &self.active == style {
            return;
        }
        if self.color {
            if !self.active.is_default() {
                self.terminal.write(RESET);
            }
            if !style.is_default() {
                self.terminal.write(self.theme.prefix(style));
            }
        }
        self.active = style.clone();
    }
}

impl<T: Terminal> Drop for StyledRenderer<T> {
    fn drop(&mut self) {
        self.reset();
        self.terminal.flush();
    }
}
