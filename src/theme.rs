//! SGR palette for [`TextStyle`].

use std::collections::BTreeMap;

use crate::style::TextStyle;

pub const RESET: &str = "\x1b[0m";

const HEADING_COLORS: [&str; 4] = ["\x1b[91m", "\x1b[93m", "\x1b[95m", "\x1b[97m"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub code: String,
    pub code_unmatched: String,
    pub headings: [String; 4],
    pub bold: String,
    pub italic: String,
    pub inline_code: String,
    pub success: String,
    pub failure: String,
    pub notice: String,
    /// Per canonical language overrides of `code`.
    pub languages: BTreeMap<String, String>,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            code: "\x1b[95m".to_string(),
            code_unmatched: "\x1b[93m".to_string(),
            headings: HEADING_COLORS.map(str::to_string),
            bold: "\x1b[1;91m".to_string(),
            italic: "\x1b[3;94m".to_string(),
            inline_code: "\x1b[36m".to_string(),
            success: "\x1b[92m".to_string(),
            failure: "\x1b[91m".to_string(),
            notice: "\x1b[2m".to_string(),
            languages: BTreeMap::new(),
        }
    }
}

impl Theme {
    pub fn with_language_color(mut self, language: &str, sgr: impl Into<String>) -> Self {
        self.languages
            .insert(language.to_ascii_lowercase(), sgr.into());
        self
    }

    /// SGR prefix for `style`. `Default` maps to a bare reset.
    pub fn prefix(&self, style: &TextStyle) -> &str {
        match style {
            TextStyle::Default => RESET,
            TextStyle::Code { language: Some(language) } => self
                .languages
                .get(language.as_str())
                .map(String::as_str)
                .unwrap_or(&self.code),
            TextStyle::Code { language: None } => &self.code_unmatched,
            TextStyle::Heading(level) => {
                let index = usize::from((*level).clamp(1, TextStyle::MAX_HEADING_LEVEL)) - 1;
                &self.headings[index]
            }
            TextStyle::Bold => &self.bold,
            TextStyle::Italic => &self.italic,
            TextStyle::InlineCode => &self.inline_code,
            TextStyle::Success => &self.success,
            TextStyle::Failure => &self.failure,
            TextStyle::Notice => &self.notice,
        }
    }
}
