use thiserror::Error;

/// A compile-time diagnostic: lexical, syntactic, or static-semantic.
///
/// Rendered as `[line N] Error at 'lexeme': message`, with the location part
/// omitted for lexical errors and replaced by `at end` at end of input.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
#[error("[line {line}] Error{location}: {message}")]
pub struct CompileError {
    pub line: u32,
    /// Empty, `" at end"`, or `" at 'lexeme'"`.
    pub location: String,
    pub message: String,
}

impl CompileError {
    /// Error at a specific token.
    pub fn at_token(line: u32, lexeme: &str, message: impl Into<String>) -> Self {
        Self {
            line,
            location: format!(" at '{}'", lexeme),
            message: message.into(),
        }
    }

    /// Error at end of input.
    pub fn at_end(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            location: " at end".to_string(),
            message: message.into(),
        }
    }

    /// Error with no token context (scanner errors).
    pub fn bare(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            location: String::new(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_at_token() {
        let err = CompileError::at_token(3, "}", "Expect expression.");
        assert_eq!(err.to_string(), "[line 3] Error at '}': Expect expression.");
    }

    #[test]
    fn renders_at_end() {
        let err = CompileError::at_end(7, "Expect ';' after value.");
        assert_eq!(
            err.to_string(),
            "[line 7] Error at end: Expect ';' after value."
        );
    }

    #[test]
    fn renders_bare() {
        let err = CompileError::bare(1, "Unterminated string.");
        assert_eq!(err.to_string(), "[line 1] Error: Unterminated string.");
    }
}
