//! Error taxonomy for a chat session and user guidance for fatal errors.
//!
//! Recoverable session errors are [`ChatError`] values that collapse into a
//! single status-line message. Startup failures are formatted through
//! [`ErrorHandler`] as an [`EnhancedError`] with recovery suggestions.

use anyhow::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recoverable failures inside a running session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// The remote service was unreachable or the stream broke mid-reply.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The conversation file could not be written.
    #[error("could not save conversations: {0}")]
    Persistence(String),
    /// A file could not be classified or read for staging.
    #[error("attachment rejected: {0}")]
    Attachment(String),
    /// The command is not valid in the current state.
    #[error("{0}")]
    InvalidOperation(String),
}

impl ChatError {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Transport(_) => "transport",
            ChatError::Persistence(_) => "persistence",
            ChatError::Attachment(_) => "attachment",
            ChatError::InvalidOperation(_) => "invalid_operation",
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            ChatError::Transport(_) => ErrorType::Network,
            ChatError::Persistence(_) => ErrorType::Resource,
            ChatError::Attachment(_) => ErrorType::Validation,
            ChatError::InvalidOperation(_) => ErrorType::Validation,
        }
    }
}

/// Enhanced error with user-friendly message and recovery suggestions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedError {
    pub title: String,
    pub message: String,
    pub suggestions: Vec<String>,
    pub error_type: ErrorType,
    pub context: Option<String>,
}

/// Types of errors for better categorization
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorType {
    /// Missing API key, invalid settings
    Configuration,
    /// Timeouts, refused connections, HTTP failures
    Network,
    /// Bad input or a command that does not apply
    Validation,
    /// Disk or file problems
    Resource,
    Unknown,
}

impl EnhancedError {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        error_type: ErrorType,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            suggestions: Vec::new(),
            error_type,
            context: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions.extend(suggestions);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn into_error(self) -> Error {
        Error::new(self)
    }

    /// Multi-line rendering for stderr.
    pub fn format(&self, verbose: bool) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}: {}\n", self.error_type.label(), self.title));
        output.push_str(&format!("  {}\n", self.message));

        if verbose && let Some(context) = &self.context {
            output.push_str(&format!("\n  Context: {}\n", context));
        }

        if !self.suggestions.is_empty() {
            output.push_str("\n  Suggestions:\n");
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("    {}. {}\n", i + 1, suggestion));
            }
        }
        output
    }
}

impl ErrorType {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorType::Configuration => "config",
            ErrorType::Network => "network",
            ErrorType::Validation => "input",
            ErrorType::Resource => "disk",
            ErrorType::Unknown => "error",
        }
    }
}

impl fmt::Display for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

impl std::error::Error for EnhancedError {}

/// Turns errors into text for the user.
pub struct ErrorHandler {
    verbose: bool,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self { verbose: false }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Multi-line message with suggestions, for fatal errors.
    pub fn handle(&self, error: &Error) -> String {
        if let Some(enhanced) = error.downcast_ref::<EnhancedError>() {
            return enhanced.format(self.verbose);
        }
        let mut enhanced = self.classify_error(&error.to_string());
        if self.verbose {
            let chain = error
                .chain()
                .skip(1)
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            if !chain.is_empty() {
                enhanced = enhanced.with_context(chain.join(": "));
            }
        }
        enhanced.format(self.verbose)
    }

    /// One line for the status bar. Only the first line of the message is kept.
    pub fn status_line(&self, error: &ChatError) -> String {
        let text = error.to_string();
        let first = text.lines().next().unwrap_or_default().trim();
        format!("[{}] {}", error.error_type().label(), first)
    }

    fn classify_error(&self, error_message: &str) -> EnhancedError {
        let lower_error = error_message.to_lowercase();

        if lower_error.contains("api key") || lower_error.contains("configuration") {
            return EnhancedError::new(
                "Configuration Error",
                error_message,
                ErrorType::Configuration,
            )
            .with_suggestions(vec![
                "Check .termchat/settings.json".to_string(),
                "Set the API_KEY environment variable or add it to .env".to_string(),
            ]);
        }

        if lower_error.contains("network")
            || lower_error.contains("timed out")
            || lower_error.contains("connection")
        {
            return EnhancedError::new("Network Error", error_message, ErrorType::Network)
                .with_suggestions(vec![
                    "Check your internet connection".to_string(),
                    "Verify llm.endpoint is reachable".to_string(),
                ]);
        }

        if lower_error.contains("permission denied") || lower_error.contains("no such file") {
            return EnhancedError::new("File Error", error_message, ErrorType::Resource)
                .with_suggestion("Check the path and its permissions");
        }

        EnhancedError::new("Error", error_message, ErrorType::Unknown)
    }
}

/// Constructors for errors that are raised from several places.
pub mod errors {
    use super::*;

    pub fn missing_api_key(env_var: &str) -> EnhancedError {
        EnhancedError::new(
            "Missing API Key",
            format!("No API key found in ${env_var}, .env, or settings."),
            ErrorType::Configuration,
        )
        .with_suggestions(vec![
            format!("Create a .env file with {env_var}=your-key-here"),
            format!("Or export {env_var}=your-key-here"),
            "Or set llm.api_key in .termchat/settings.json".to_string(),
        ])
    }

    pub fn invalid_configuration(detail: &str) -> EnhancedError {
        EnhancedError::new("Invalid Configuration", detail, ErrorType::Configuration)
            .with_suggestions(vec![
                "Check ~/.termchat/settings.json and .termchat/settings.json".to_string(),
                "Remove invalid settings and retry".to_string(),
            ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn enhanced_error_lists_numbered_suggestions() {
        let error = EnhancedError::new("Test Error", "Something went wrong", ErrorType::Unknown)
            .with_suggestion("Try again")
            .with_suggestion("Check documentation");

        let formatted = error.format(false);
        assert!(formatted.contains("Test Error"));
        assert!(formatted.contains("Something went wrong"));
        assert!(formatted.contains("1. Try again"));
        assert!(formatted.contains("2. Check documentation"));
    }

    #[test]
    fn handler_classifies_plain_errors() {
        let handler = ErrorHandler::new();
        let output = handler.handle(&anyhow!("API key is missing"));
        assert!(output.contains("Configuration Error"));

        let output = handler.handle(&anyhow!("connection refused"));
        assert!(output.contains("Network Error"));
    }

    #[test]
    fn into_error_preserves_enhanced_type() {
        let handler = ErrorHandler::new();
        let error = errors::missing_api_key("API_KEY").into_error();
        let output = handler.handle(&error);
        assert!(output.contains("Missing API Key"));
        assert!(output.contains("API_KEY=your-key-here"));
    }

    #[test]
    fn status_line_is_single_line_and_tagged() {
        let handler = ErrorHandler::new();
        let line = handler.status_line(&ChatError::Transport(
            "Request timed out.\nRetrying with exponential backoff.".to_string(),
        ));
        assert_eq!(line, "[network] transport failure: Request timed out.");

        let line = handler.status_line(&ChatError::InvalidOperation(
            "cannot delete the only conversation".to_string(),
        ));
        assert_eq!(line, "[input] cannot delete the only conversation");
    }

    #[test]
    fn chat_error_kinds_are_stable() {
        assert_eq!(ChatError::Persistence("x".into()).kind(), "persistence");
        assert_eq!(ChatError::Attachment("x".into()).kind(), "attachment");
    }
}
