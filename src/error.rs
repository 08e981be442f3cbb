use std::path::PathBuf;

use thiserror::Error;

/// Boundary errors: files, decoding and configuration.
///
/// The estimators themselves never return these; a missed frame or a rejected
/// dead-reckoning step is reported as `false` and only logged.
#[derive(Error, Debug)]
pub enum NavError {
    #[error("cannot read input {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write output {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("terrain grid: {0}")]
    Terrain(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[cfg(feature = "cv")]
    #[error("opencv: {0}")]
    Video(#[from] opencv::Error),
}

impl NavError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            NavError::Input { .. } | NavError::Image { .. } => 2,
            #[cfg(feature = "cv")]
            NavError::Video(_) => 2,
            NavError::Output { .. } => 3,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, NavError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_input_and_output() {
        let input = NavError::Input {
            path: "log.csv".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let output = NavError::Output {
            path: "out.csv".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(input.exit_code(), 2);
        assert_eq!(output.exit_code(), 3);
        assert_eq!(NavError::Config("fps".into()).exit_code(), 1);
    }
}
