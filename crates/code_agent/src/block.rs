/// A fenced code block recognized in the model stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub code: String,
    /// Canonical language tag, see [`crate::language::LANGUAGE_TAGS`].
    pub language: String,
}

impl CodeBlock {
    #[must_use]
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
        }
    }
}

/// Result of running one code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub message: String,
}

impl ExecutionOutcome {
    /// Outcome for a process that exited with status zero.
    #[must_use]
    pub fn succeeded(stdout: &str) -> Self {
        let message = if stdout.is_empty() {
            "Execution succeeded.\n".to_string()
        } else {
            format!("Execution succeeded:\n{stdout}\n")
        };
        Self {
            success: true,
            message,
        }
    }

    /// Outcome for a process that ran and exited with a non-zero status.
    #[must_use]
    pub fn failed(stderr: &str) -> Self {
        let message = if stderr.is_empty() {
            "Execution failed.\n".to_string()
        } else {
            format!("Execution failed: {stderr}\n")
        };
        Self::failure(message)
    }

    /// Failure with a fixed message.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_messages_depend_on_output() {
        assert_eq!(
            ExecutionOutcome::succeeded("hi\n").message,
            "Execution succeeded:\nhi\n\n"
        );
        assert_eq!(
            ExecutionOutcome::succeeded("").message,
            "Execution succeeded.\n"
        );
    }

    #[test]
    fn failure_messages_depend_on_stderr() {
        let outcome = ExecutionOutcome::failed("boom");
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Execution failed: boom\n");
        assert_eq!(ExecutionOutcome::failed("").message, "Execution failed.\n");
    }
}
