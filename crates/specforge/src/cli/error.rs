//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add multiple suggestions
    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// OPENROUTER_API_KEY is not set
    pub fn missing_api_key() -> Self {
        Self::new("OpenRouter API key not found")
            .with_context("Synthesis and repair calls need the OPENROUTER_API_KEY environment variable")
            .with_suggestions([
                "TRY: export OPENROUTER_API_KEY=sk-or-...".to_string(),
                "TRY: Get a key at https://openrouter.ai/keys".to_string(),
            ])
    }

    /// Topic search returned nothing
    pub fn no_repos_found(topic: &str) -> Self {
        Self::new(format!("No repositories found for topic '{}'", topic))
            .with_context("The GitHub topic search returned zero results")
            .with_suggestions([
                format!("TRY: Browse topics at https://github.com/topics/{}", topic),
                "TRY: Use a broader topic, e.g. 'cli' or 'note-taking'".to_string(),
                "TRY: Set GITHUB_TOKEN to raise the unauthenticated rate limit".to_string(),
            ])
    }

    /// File does not exist
    pub fn file_not_found(path: &Path) -> Self {
        Self::new(format!("File not found: {}", path.display()))
            .with_context("The specified file does not exist")
            .with_suggestions([
                format!("TRY: Check if the file exists: ls -la {}", path.display()),
                "TRY: Check for typos in the path".to_string(),
            ])
    }

    /// File exists but does not parse as the expected JSON shape
    pub fn invalid_json_file(path: &Path, details: &str) -> Self {
        Self::new(format!("Invalid JSON in {}", path.display()))
            .with_context(details.to_string())
            .with_suggestions([
                "TRY: Validate the JSON: cat FILE | python -m json.tool".to_string(),
                "TRY: Pass a repo card or an evidence array as written by a run".to_string(),
            ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Print an error as a JSON object on stdout, for --json mode.
pub fn print_json_error(err: &anyhow::Error) {
    let payload = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "error": helpful.message,
            "context": helpful.context,
            "suggestions": helpful.suggestions,
        }),
        None => serde_json::json!({ "error": format!("{:#}", err) }),
    };
    println!("{}", payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_helpful_error_display() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While processing data")
            .with_suggestion("Try again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While processing data"));
        assert!(display.contains("Try again"));
    }

    #[test]
    fn test_missing_api_key_mentions_env_var() {
        let display = format!("{}", HelpfulError::missing_api_key());
        assert!(display.contains("OPENROUTER_API_KEY"));
        assert!(display.contains("TRY:"));
    }

    #[test]
    fn test_file_not_found() {
        let path = PathBuf::from("/nonexistent/card.json");
        let display = format!("{}", HelpfulError::file_not_found(&path));
        assert!(display.contains("/nonexistent/card.json"));
        assert!(display.contains("TRY:"));
    }
}
