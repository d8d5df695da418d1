//! Style model shared by the scanner and the renderer.

/// Style attached to a run of text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TextStyle {
    #[default]
    Default,
    /// Inside a fenced code block. `language` is the canonical tag matched from the fence line.
    Code { language: Option<String> },
    /// Heading level, always in `1..=4`.
    Heading(u8),
    Bold,
    Italic,
    InlineCode,
    Success,
    Failure,
    Notice,
}

impl TextStyle {
    pub const MAX_HEADING_LEVEL: u8 = 4;

    /// Heading style with the level clamped into `1..=4`.
    pub fn heading(level: usize) -> Self {
        let clamped = level.clamp(1, Self::MAX_HEADING_LEVEL as usize);
        Self::Heading(clamped as u8)
    }

    pub fn code(language: impl Into<String>) -> Self {
        let language = language.into();
        if language.trim().is_empty() {
            Self::Code { language: None }
        } else {
            Self::Code {
                language: Some(language.trim().to_string()),
            }
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

/// Text plus the style it should be rendered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSegment {
    pub text: String,
    pub style: TextStyle,
}

impl StyledSegment {
    pub fn new(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, TextStyle::Default)
    }
}

/// Appends `text` to the last segment when it shares `style`, otherwise starts a new one.
pub fn push_styled(segments: &mut Vec<StyledSegment>, text: &str, style: &TextStyle) {
    if text.is_empty() {
        return;
    }
    if let Some(last) = segments.last_mut() {
        if &last.style == style {
            last.text.push_str(text);
            return;
        }
    }
    segments.push(StyledSegment::new(text, style.clone()));
}
