//! Error types for the VRM stage

use thiserror::Error;

/// Main error type for the stage
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Avatar load error: {0}")]
    Load(#[from] LoadError),

    #[error("Animation clip error: {0}")]
    Clip(#[from] ClipError),

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Binary scene container errors (GLB framing)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("Invalid magic: 0x{0:08X}")]
    InvalidMagic(u32),

    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u32),

    #[error("Truncated container: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unexpected chunk type 0x{found:08X} (expected 0x{expected:08X})")]
    UnexpectedChunk { expected: u32, found: u32 },

    #[error("Missing JSON chunk")]
    MissingJson,
}

/// Avatar load errors. Fatal to the load attempt that produced them.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read avatar: {0}")]
    Read(String),

    #[error("Malformed avatar container: {0}")]
    Container(#[from] ContainerError),

    #[error("Malformed avatar: {0}")]
    Malformed(String),

    #[error("Asset has no VRM extension block")]
    NotVrm,

    #[error("Failed to allocate avatar resources: {0}")]
    Resources(String),

    #[error("Load task ended without a result")]
    TaskFailed,

    #[error("Load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Text shown to the user when a load fails
    pub fn user_message(&self) -> String {
        match self {
            LoadError::NotVrm => "The selected file is not a VRM avatar".to_string(),
            _ => "Failed to load the VRM file".to_string(),
        }
    }
}

/// Animation clip errors. Optional asset, never fatal to an avatar load.
#[derive(Error, Debug)]
pub enum ClipError {
    #[error("Failed to read clip: {0}")]
    Read(String),

    #[error("Malformed clip container: {0}")]
    Container(#[from] ContainerError),

    #[error("Clip JSON parse error: {0}")]
    Json(String),

    #[error("Invalid accessor {index}: {message}")]
    Accessor { index: usize, message: String },

    #[error("Clip contains no animation")]
    NoAnimation,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors raised by the renderer collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Resource allocation failed: {0}")]
    Allocation(String),

    #[error("Renderer already disposed")]
    Disposed,
}

/// Result type alias for stage operations
pub type Result<T> = std::result::Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_user_message() {
        assert_eq!(
            LoadError::Read("nope".into()).user_message(),
            "Failed to load the VRM file"
        );
        assert_eq!(
            LoadError::NotVrm.user_message(),
            "The selected file is not a VRM avatar"
        );
    }

    #[test]
    fn test_error_conversion() {
        let err: StageError = LoadError::Container(ContainerError::MissingJson).into();
        assert!(err.to_string().contains("Missing JSON chunk"));

        let err: LoadError = ContainerError::InvalidMagic(0xDEADBEEF).into();
        assert!(err.to_string().contains("0xDEADBEEF"));
    }
}
