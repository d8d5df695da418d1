//! Incremental markdown and code-fence scanner.
//!
//! The scanner consumes the model stream one character at a time and never looks ahead, so a
//! fence or a language line split across chunks is handled by the state carried between calls.
//! Two machines run side by side: the fence machine decides whether a character belongs to a
//! code block, and the line formatter styles everything outside blocks (headings, bold, italic,
//! inline code).

use code_atlas::{push_styled, StyledSegment, TextStyle};

use crate::block::CodeBlock;
use crate::language::match_language_line;

const FENCE_LEN: u8 = 3;

/// Position of the fence machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    Idle,
    /// Backticks seen outside a block, fewer than a full fence.
    AccumulatingOpenFence(u8),
    CapturingLanguageLine,
    InBlockBody,
    /// Backticks seen inside a block, fewer than a full fence.
    AccumulatingCloseFence(u8),
}

/// Everything produced while scanning some input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput {
    pub segments: Vec<StyledSegment>,
    pub blocks: Vec<CodeBlock>,
}

impl ScanOutput {
    fn emit(&mut self, text: &str, style: &TextStyle) {
        push_styled(&mut self.segments, text, style);
    }

    /// Rendered text with styles dropped.
    #[must_use]
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.blocks.is_empty()
    }

    /// Appends `other`, merging a style run that continues across the boundary.
    pub fn extend(&mut self, other: ScanOutput) {
        for segment in other.segments {
            push_styled(&mut self.segments, &segment.text, &segment.style);
        }
        self.blocks.extend(other.blocks);
    }
}

#[derive(Debug)]
pub struct Scanner {
    state: ScannerState,
    language_line: String,
    language: Option<&'static str>,
    body: String,
    line: LineFormatter,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ScannerState::Idle,
            language_line: String::new(),
            language: None,
            body: String::new(),
            line: LineFormatter::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ScannerState {
        self.state
    }

    /// Whether the scanner is between an opening and a closing fence.
    #[must_use]
    pub fn in_block(&self) -> bool {
        matches!(
            self.state,
            ScannerState::CapturingLanguageLine
                | ScannerState::InBlockBody
                | ScannerState::AccumulatingCloseFence(_)
        )
    }

    /// Scans a whole chunk.
    pub fn feed(&mut self, chunk: &str) -> ScanOutput {
        let mut out = ScanOutput::default();
        for ch in chunk.chars() {
            self.process(ch, &mut out);
        }
        out
    }

    /// Consumes exactly one character.
    pub fn process(&mut self, ch: char, out: &mut ScanOutput) {
        match self.state {
            ScannerState::Idle => {
                if ch == '`' {
                    self.state = ScannerState::AccumulatingOpenFence(1);
                } else {
                    self.line.process(ch, out);
                }
            }
            ScannerState::AccumulatingOpenFence(count) => {
                if ch == '`' {
                    if count + 1 == FENCE_LEN {
                        self.open_block(out);
                    } else {
                        self.state = ScannerState::AccumulatingOpenFence(count + 1);
                    }
                } else {
                    self.state = ScannerState::Idle;
                    self.line.flush_backticks(count, out);
                    self.line.process(ch, out);
                }
            }
            ScannerState::CapturingLanguageLine => {
                if ch == '\n' {
                    self.language = match_language_line(&self.language_line);
                    tracing::trace!(
                        line = %self.language_line,
                        language = ?self.language,
                        "code fence opened"
                    );
                    self.state = ScannerState::InBlockBody;
                } else {
                    self.language_line.push(ch);
                }
            }
            ScannerState::InBlockBody => {
                if ch == '`' {
                    self.state = ScannerState::AccumulatingCloseFence(1);
                } else {
                    self.push_body(&ch.to_string(), out);
                }
            }
            ScannerState::AccumulatingCloseFence(count) => {
                if ch == '`' {
                    if count + 1 == FENCE_LEN {
                        self.close_block(out);
                    } else {
                        self.state = ScannerState::AccumulatingCloseFence(count + 1);
                    }
                } else {
                    self.state = ScannerState::InBlockBody;
                    self.push_body(&"`".repeat(count as usize), out);
                    self.push_body(&ch.to_string(), out);
                }
            }
        }
    }

    /// Ends the current line for formatting purposes without emitting text.
    ///
    /// Called at a turn boundary so bold, italic and heading state never leak into the next
    /// turn. Fence state is untouched.
    pub fn finish_line(&mut self, out: &mut ScanOutput) {
        self.line.finish_line(out);
    }

    /// The fence takes over the rest of the line, so pending hashes are written first and
    /// inline formatting ends here.
    fn open_block(&mut self, out: &mut ScanOutput) {
        self.line.finish_line(out);
        self.state = ScannerState::CapturingLanguageLine;
        self.language_line.clear();
        self.body.clear();
        self.language = None;
    }

    fn push_body(&mut self, text: &str, out: &mut ScanOutput) {
        self.body.push_str(text);
        let style = TextStyle::Code {
            language: self.language.map(str::to_string),
        };
        out.emit(text, &style);
    }

    fn close_block(&mut self, out: &mut ScanOutput) {
        let code = std::mem::take(&mut self.body);
        match self.language.take() {
            Some(language) => {
                tracing::debug!(language, bytes = code.len(), "code block completed");
                out.blocks.push(CodeBlock::new(code, language));
            }
            None => {
                tracing::debug!(
                    line = %self.language_line,
                    "discarding block without a runnable language"
                );
            }
        }
        self.language_line.clear();
        self.state = ScannerState::Idle;
    }
}

/// Per-line formatting outside code blocks.
#[derive(Debug)]
struct LineFormatter {
    line_start: bool,
    pending_hashes: usize,
    base: TextStyle,
    bold: bool,
    italic: bool,
    inline_code: bool,
    /// Formatting marker seen immediately before the current character, not yet paired.
    last_marker: Option<char>,
}

impl Default for LineFormatter {
    fn default() -> Self {
        Self {
            line_start: true,
            pending_hashes: 0,
            base: TextStyle::Default,
            bold: false,
            italic: false,
            inline_code: false,
            last_marker: None,
        }
    }
}

impl LineFormatter {
    fn process(&mut self, ch: char, out: &mut ScanOutput) {
        if ch == '\n' {
            self.flush_hashes(out);
            out.emit("\n", &TextStyle::Default);
            *self = Self::default();
            return;
        }

        if self.line_start {
            if ch == '#' {
                self.pending_hashes += 1;
                return;
            }
            if self.pending_hashes > 0 && ch == ' ' {
                self.base = TextStyle::heading(self.pending_hashes);
                self.pending_hashes = 0;
                self.line_start = false;
                return;
            }
            self.flush_hashes(out);
        }

        if self.inline_code {
            self.last_marker = None;
            out.emit(&ch.to_string(), &TextStyle::InlineCode);
            return;
        }

        if ch == '*' || ch == '_' {
            self.toggle_marker(ch);
            return;
        }

        self.last_marker = None;
        out.emit(&ch.to_string(), &self.current_style());
    }

    /// Renders a backtick run that did not become a fence and toggles an inline-code span.
    fn flush_backticks(&mut self, count: u8, out: &mut ScanOutput) {
        self.flush_hashes(out);
        self.last_marker = None;
        out.emit(&"`".repeat(count as usize), &TextStyle::Default);
        self.inline_code = !self.inline_code;
    }

    fn finish_line(&mut self, out: &mut ScanOutput) {
        self.flush_hashes(out);
        *self = Self::default();
    }

    fn toggle_marker(&mut self, marker: char) {
        if self.last_marker == Some(marker) {
            self.bold = !self.bold;
            self.last_marker = None;
        } else {
            self.italic = !self.italic;
            self.last_marker = Some(marker);
        }
    }

    fn flush_hashes(&mut self, out: &mut ScanOutput) {
        if self.pending_hashes > 0 {
            out.emit(&"#".repeat(self.pending_hashes), &TextStyle::Default);
            self.pending_hashes = 0;
        }
        self.line_start = false;
    }

    fn current_style(&self) -> TextStyle {
        if self.bold {
            TextStyle::Bold
        } else if self.italic {
            TextStyle::Italic
        } else {
            self.base.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn seg(text: &str, style: TextStyle) -> StyledSegment {
        StyledSegment::new(text, style)
    }

    fn code(language: Option<&str>) -> TextStyle {
        TextStyle::Code {
            language: language.map(str::to_string),
        }
    }

    #[test]
    fn recognized_block_is_queued_and_rendered_as_code() {
        let mut scanner = Scanner::new();
        let out = scanner.feed("Run:\n```python\nprint('hi')\n```\n");

        assert_eq!(
            out.blocks,
            vec![CodeBlock::new("print('hi')\n", "python")]
        );
        assert_eq!(
            out.segments,
            vec![
                seg("Run:\n", TextStyle::Default),
                seg("print('hi')\n", code(Some("python"))),
                seg("\n", TextStyle::Default),
            ]
        );
        assert_eq!(scanner.state(), ScannerState::Idle);
    }

    #[test]
    fn unknown_language_renders_identically_but_is_not_queued() {
        let known = Scanner::new().feed("```bash\nls\n```\n");
        let unknown = Scanner::new().feed("```rust\nls\n```\n");

        assert!(unknown.blocks.is_empty());
        assert_eq!(known.blocks.len(), 1);
        assert_eq!(known.text(), unknown.text());
        assert_eq!(unknown.segments[0], seg("ls\n", code(None)));
    }

    #[test]
    fn short_backtick_runs_are_literal_and_never_open_a_block() {
        let mut scanner = Scanner::new();
        let out = scanner.feed("use `ls` or ``pwd`` here\n");

        assert!(out.blocks.is_empty());
        assert_eq!(out.text(), "use `ls` or ``pwd`` here\n");
        assert_eq!(scanner.state(), ScannerState::Idle);
        assert!(out.segments.contains(&seg("ls", TextStyle::InlineCode)));
        assert!(out.segments.contains(&seg("pwd", TextStyle::InlineCode)));
    }

    #[test]
    fn inline_code_keeps_markers_literal_and_ends_at_newline() {
        let out = Scanner::new().feed("`a*b*` *c*\nd\n");
        assert_eq!(
            out.segments,
            vec![
                seg("`", TextStyle::Default),
                seg("a*b*", TextStyle::InlineCode),
                seg("` ", TextStyle::Default),
                seg("c", TextStyle::Italic),
                seg("\nd\n", TextStyle::Default),
            ]
        );
    }

    #[test]
    fn short_backtick_runs_inside_a_block_stay_in_the_body() {
        let mut scanner = Scanner::new();
        let out = scanner.feed("```sh\necho `date` ``x``\n```");

        assert_eq!(
            out.blocks,
            vec![CodeBlock::new("echo `date` ``x``\n", "shell")]
        );
        assert_eq!(out.text(), "echo `date` ``x``\n");
    }

    #[test]
    fn headings_consume_markers_and_clamp_to_level_four() {
        let out = Scanner::new().feed("# Title\n###### Deep\n");
        assert_eq!(
            out.segments,
            vec![
                seg("Title", TextStyle::Heading(1)),
                seg("\n", TextStyle::Default),
                seg("Deep", TextStyle::Heading(4)),
                seg("\n", TextStyle::Default),
            ]
        );
    }

    #[test]
    fn hashes_without_a_space_are_flushed_verbatim() {
        let out = Scanner::new().feed("#tag and ## not heading\n##\n");
        assert_eq!(out.text(), "#tag and ## not heading\n##\n");
        assert!(out
            .segments
            .iter()
            .all(|segment| segment.style == TextStyle::Default));
    }

    #[test]
    fn single_markers_toggle_italic_and_doubled_markers_toggle_bold() {
        let out = Scanner::new().feed("a *it* __bold__ **b**\n");
        assert_eq!(
            out.segments,
            vec![
                seg("a ", TextStyle::Default),
                seg("it", TextStyle::Italic),
                seg(" ", TextStyle::Default),
                seg("bold", TextStyle::Bold),
                seg(" ", TextStyle::Default),
                seg("b", TextStyle::Bold),
                seg("\n", TextStyle::Default),
            ]
        );
    }

    #[test]
    fn markers_separated_by_text_stay_italic() {
        let out = Scanner::new().feed("*a* *b*\n");
        assert_eq!(
            out.segments,
            vec![
                seg("a", TextStyle::Italic),
                seg(" ", TextStyle::Default),
                seg("b", TextStyle::Italic),
                seg("\n", TextStyle::Default),
            ]
        );
    }

    #[test]
    fn pending_hashes_are_written_before_a_fence_opens() {
        let out = Scanner::new().feed("#```sh\necho\n```\n");
        assert_eq!(out.text(), "#echo\n\n");
        assert_eq!(out.blocks, vec![CodeBlock::new("echo\n", "shell")]);
    }

    #[test]
    fn fence_ends_an_open_inline_code_span() {
        let out = Scanner::new().feed("`x ```sh\necho\n``` tail *i*\n");
        assert_eq!(
            out.segments,
            vec![
                seg("`", TextStyle::Default),
                seg("x ", TextStyle::InlineCode),
                seg("echo\n", code(Some("shell"))),
                seg(" tail ", TextStyle::Default),
                seg("i", TextStyle::Italic),
                seg("\n", TextStyle::Default),
            ]
        );
        assert_eq!(out.blocks, vec![CodeBlock::new("echo\n", "shell")]);
    }

    #[test]
    fn newline_resets_unpaired_markers_and_heading() {
        let out = Scanner::new().feed("## *open\nplain\n");
        assert_eq!(
            out.segments,
            vec![
                seg("open", TextStyle::Italic),
                seg("\nplain\n", TextStyle::Default),
            ]
        );
    }

    #[test]
    fn heading_text_takes_bold_over_base_style() {
        let out = Scanner::new().feed("# A **B**\n");
        assert_eq!(
            out.segments,
            vec![
                seg("A ", TextStyle::Heading(1)),
                seg("B", TextStyle::Bold),
                seg("\n", TextStyle::Default),
            ]
        );
    }

    #[test]
    fn fence_and_language_line_are_resumable_across_chunks() {
        let mut scanner = Scanner::new();
        let mut out = ScanOutput::default();
        for chunk in ["``", "`py", "thon\npri", "nt(1)\n`", "``"] {
            out.extend(scanner.feed(chunk));
        }
        assert_eq!(out.blocks, vec![CodeBlock::new("print(1)\n", "python")]);
        assert_eq!(scanner.state(), ScannerState::Idle);
    }

    #[test]
    fn state_tracks_the_fence_machine() {
        let mut scanner = Scanner::new();
        let mut out = ScanOutput::default();
        scanner.process('`', &mut out);
        assert_eq!(scanner.state(), ScannerState::AccumulatingOpenFence(1));
        scanner.process('`', &mut out);
        scanner.process('`', &mut out);
        assert_eq!(scanner.state(), ScannerState::CapturingLanguageLine);
        assert!(scanner.in_block());
        for ch in "ps1\nx`".chars() {
            scanner.process(ch, &mut out);
        }
        assert_eq!(scanner.state(), ScannerState::AccumulatingCloseFence(1));
        assert!(out.blocks.is_empty());
    }

    #[test]
    fn finish_line_resets_formatting_without_emitting_text() {
        let mut scanner = Scanner::new();
        let mut out = scanner.feed("**loud");
        scanner.finish_line(&mut out);
        out.extend(scanner.feed("quiet"));

        assert_eq!(
            out.segments,
            vec![
                seg("loud", TextStyle::Bold),
                seg("quiet", TextStyle::Default),
            ]
        );
    }

    #[test]
    fn finish_line_flushes_a_pending_hash_run() {
        let mut scanner = Scanner::new();
        let mut out = scanner.feed("##");
        scanner.finish_line(&mut out);
        assert_eq!(out.text(), "##");
    }

    #[test]
    fn blocks_are_emitted_in_closing_order() {
        let out = Scanner::new().feed("```py\na\n```\ntext\n```bat\nb\n```\n");
        assert_eq!(
            out.blocks,
            vec![CodeBlock::new("a\n", "python"), CodeBlock::new("b\n", "batch")]
        );
    }
}
