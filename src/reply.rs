//! Interpretation of model replies.

/// Prefix the model uses to ask for a shell command.
pub const SHELL_SENTINEL: &str = "EXECUTE_SHELL:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    /// Plain text to show the user as-is
    Text(String),
    /// Command line to run
    Shell(String),
}

impl ModelReply {
    pub fn parse(reply: &str) -> Self {
        match reply.strip_prefix(SHELL_SENTINEL) {
            Some(rest) => Self::Shell(rest.trim().to_string()),
            None => Self::Text(reply.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_reply() {
        assert_eq!(
            ModelReply::parse("EXECUTE_SHELL: echo hi"),
            ModelReply::Shell("echo hi".to_string())
        );
    }

    #[test]
    fn test_sentinel_trims_surrounding_whitespace() {
        assert_eq!(
            ModelReply::parse("EXECUTE_SHELL:   ls -la\n"),
            ModelReply::Shell("ls -la".to_string())
        );
    }

    #[test]
    fn test_plain_text_unchanged() {
        let text = "The capital of France is Paris.";
        assert_eq!(ModelReply::parse(text), ModelReply::Text(text.to_string()));
    }

    #[test]
    fn test_sentinel_must_be_prefix() {
        let text = "  EXECUTE_SHELL: rm -rf /";
        assert_eq!(ModelReply::parse(text), ModelReply::Text(text.to_string()));

        let text = "run EXECUTE_SHELL: ls";
        assert_eq!(ModelReply::parse(text), ModelReply::Text(text.to_string()));
    }
}
