use std::fmt;

/// A runtime failure: the message plus a stack trace, innermost frame first.
///
/// Renders as the message followed by one `[line N] in name()` line per live
/// call frame (`[line N] in script` for the top level).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RuntimeError {
    pub message: String,
    pub trace: Vec<String>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for line in &self.trace {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_message_then_trace() {
        let err = RuntimeError {
            message: "Undefined variable 'x'.".to_string(),
            trace: vec![
                "[line 3] in inner()".to_string(),
                "[line 7] in script".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Undefined variable 'x'.\n[line 3] in inner()\n[line 7] in script"
        );
    }

    #[test]
    fn renders_without_trace() {
        let err = RuntimeError {
            message: "Stack overflow.".to_string(),
            trace: Vec::new(),
        };
        assert_eq!(err.to_string(), "Stack overflow.");
    }
}
