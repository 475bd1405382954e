//! Helpful error output for CLI commands
//!
//! Fatal stage errors are printed with what went wrong, the stage context,
//! and what to try next. Exit codes follow the pipeline error class so a
//! scheduler can tell "retry later" from "needs a fix".

use exitcast::PipelineError;
use std::fmt;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Describe a failed command.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let Some(pipeline) = err.downcast_ref::<PipelineError>() else {
            return Self::new(format!("{:#}", err));
        };
        let mut helpful = Self::new(pipeline.to_string());
        let outer = err.to_string();
        if outer != helpful.message {
            helpful = helpful.with_context(outer);
        }
        match pipeline {
            PipelineError::Config(_) => helpful
                .with_suggestion("TRY: Set the variable named above or pass the matching flag")
                .with_suggestion("TRY: exitcast <command> --help lists every setting and its env var"),
            PipelineError::Connectivity(_) => helpful
                .with_suggestion("TRY: Check DATABASE_URL host, port and credentials")
                .with_suggestion("TRY: Re-run the whole stage once the store is reachable; it is safe to repeat"),
            PipelineError::ArtifactMissing(_) => helpful
                .with_suggestion("TRY: Run the producing stage first (extract before infer, infer before apply)")
                .with_suggestion("TRY: Check EXITCAST_ARTIFACT_DIR and the object name settings"),
            PipelineError::SchemaMismatch(_) => helpful
                .with_suggestion("TRY: Compare the store columns with `exitcast schema`"),
            PipelineError::ModelMismatch(_) => helpful.with_suggestion(
                "TRY: Retrain or re-export the model against the current feature schema version",
            ),
            _ => helpful,
        }
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

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<PipelineError>()
        .map(PipelineError::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_pipeline_error_gets_suggestions() {
        let err = Err::<(), _>(PipelineError::config("DATABASE_URL is not set"))
            .context("extract stage failed")
            .unwrap_err();
        let helpful = HelpfulError::from_anyhow(&err);
        let rendered = helpful.to_string();
        assert!(rendered.contains("ERROR: Configuration error: DATABASE_URL is not set"));
        assert!(rendered.contains("CONTEXT: extract stage failed"));
        assert!(rendered.contains("TRY:"));
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn test_other_errors_exit_one() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(exit_code(&err), 1);
        assert!(HelpfulError::from_anyhow(&err).suggestions.is_empty());
    }
}
