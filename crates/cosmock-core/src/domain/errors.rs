use std::error::Error;
use std::fmt::{Display, Formatter};

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineErrorCategory {
    Success,
    ConfigurationError,
    IoSystemError,
    ExternalProcessError,
    ComputationError,
    InternalError,
}

impl PipelineErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::ConfigurationError => 2,
            Self::IoSystemError => 3,
            Self::ExternalProcessError => 4,
            Self::ComputationError => 5,
            Self::InternalError => 6,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::ConfigurationError => "ConfigurationError",
            Self::IoSystemError => "IoSystemError",
            Self::ExternalProcessError => "ExternalProcessError",
            Self::ComputationError => "ComputationError",
            Self::InternalError => "InternalError",
        }
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// Error carried across every pipeline stage.
///
/// `code` is a stable dotted identifier (`CONFIG.PARSE`, `RUN.DISP2LPT`, ...)
/// that scripts can match on without parsing the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineError {
    category: PipelineErrorCategory,
    code: &'static str,
    message: String,
}

impl PipelineError {
    pub fn new(
        category: PipelineErrorCategory,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code,
            message: message.into(),
        }
    }

    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(PipelineErrorCategory::ConfigurationError, code, message)
    }

    pub fn io_system(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(PipelineErrorCategory::IoSystemError, code, message)
    }

    pub fn external_process(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(PipelineErrorCategory::ExternalProcessError, code, message)
    }

    pub fn computation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(PipelineErrorCategory::ComputationError, code, message)
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(PipelineErrorCategory::InternalError, code, message)
    }

    pub const fn category(&self) -> PipelineErrorCategory {
        self.category
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.code, self.message)
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.code,
            self.message
        )
    }
}

impl Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::{PipelineError, PipelineErrorCategory};

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (PipelineErrorCategory::Success, 0, "Success"),
            (PipelineErrorCategory::ConfigurationError, 2, "ConfigurationError"),
            (PipelineErrorCategory::IoSystemError, 3, "IoSystemError"),
            (
                PipelineErrorCategory::ExternalProcessError,
                4,
                "ExternalProcessError",
            ),
            (PipelineErrorCategory::ComputationError, 5, "ComputationError"),
            (PipelineErrorCategory::InternalError, 6, "InternalError"),
        ];

        for (category, exit_code, name) in cases {
            assert_eq!(category.exit_code(), exit_code);
            assert_eq!(category.as_str(), name);
        }
    }

    #[test]
    fn fatal_error_renders_diagnostic_lines() {
        let error = PipelineError::external_process(
            "RUN.DISP2LPT",
            "2LPT failed for seed 42, return code 1",
        );

        assert_eq!(error.exit_code(), 4);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [RUN.DISP2LPT] 2LPT failed for seed 42, return code 1"
        );
        assert_eq!(
            error.fatal_exit_line().as_deref(),
            Some("FATAL EXIT CODE: 4")
        );
        assert_eq!(
            error.to_string(),
            "ExternalProcessError [RUN.DISP2LPT] 2LPT failed for seed 42, return code 1"
        );
    }
}
