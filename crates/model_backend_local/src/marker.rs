/// Number of trailing system-prompt words the model echoes once it has loaded.
pub const MARKER_WORDS: usize = 5;

/// Returns the last [`MARKER_WORDS`] whitespace-separated words of `prompt`, joined by spaces.
#[must_use]
pub fn ready_marker(prompt: &str) -> String {
    let words: Vec<&str> = prompt.split_whitespace().collect();
    let start = words.len().saturating_sub(MARKER_WORDS);
    words[start..].join(" ")
}

/// Detects the ready marker in a stream of output chunks.
///
/// Keeps just enough of the previous chunks to catch a marker split across reads.
#[derive(Debug, Clone)]
pub struct MarkerDetector {
    marker: String,
    tail: String,
}

impl MarkerDetector {
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            tail: String::new(),
        }
    }

    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Returns true when the marker completes inside `chunk`.
    ///
    /// An empty marker matches the first chunk.
    pub fn feed(&mut self, chunk: &str) -> bool {
        if self.marker.is_empty() {
            return true;
        }

        self.tail.push_str(chunk);
        if self.tail.contains(&self.marker) {
            self.tail.clear();
            return true;
        }

        let keep = self.marker.len().saturating_sub(1);
        if self.tail.len() > keep {
            let mut cut = self.tail.len() - keep;
            while !self.tail.is_char_boundary(cut) {
                cut += 1;
            }
            self.tail.drain(..cut);
        }
        false
    }
}
