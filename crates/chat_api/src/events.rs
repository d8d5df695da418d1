/// Normalized item decoded from one `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStreamEvent {
    /// Text from `choices[0].delta.content`.
    ContentDelta { text: String },
    /// `choices[0].finish_reason`, e.g. `stop` or `length`.
    FinishReason { reason: String },
    /// The `[DONE]` sentinel.
    Done,
    /// An `error` object embedded in the stream.
    Error {
        code: Option<String>,
        message: Option<String>,
    },
}

impl ChatStreamEvent {
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::ContentDelta { text } => Some(text),
            _ => None,
        }
    }
}
