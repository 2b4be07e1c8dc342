//! Error types for App Control simulation.
//!
//! Per-file failures are converted into verdicts by the pipeline; only the
//! variants raised during pre-flight validation ever leave `Simulation::run`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for simulation operations
pub type SimulationResult<T> = Result<T, SimulationError>;

/// Comprehensive error types for simulation operations
#[derive(Error, Debug, miette::Diagnostic)]
pub enum SimulationError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("PE file parsing error: {0}")]
    PeParsingError(String),

    /// A hashing primitive reported a non-zero status.
    #[error("Hash computation failed: {0}")]
    HashingError(String),

    /// The file's contents no longer match its embedded signature.
    #[error("Hash mismatch in the signature of {}", path.display())]
    #[diagnostic(help("the file was modified after it was signed"))]
    HashMismatch { path: PathBuf },

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("ASN.1 encoding/decoding error: {0}")]
    Asn1Error(String),

    #[error("PKCS#7 structure error: {0}")]
    Pkcs7Error(String),

    #[error("Catalog error: {0}")]
    CatalogError(String),

    #[error("Policy error: {0}")]
    PolicyError(String),

    #[error("No valid files were selected for simulation")]
    #[diagnostic(help("pass at least one --file or a --folder containing supported files"))]
    NoValidFilesSelected,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Worker thread error: {0}")]
    ThreadError(String),
}

impl From<der::Error> for SimulationError {
    fn from(error: der::Error) -> Self {
        SimulationError::Asn1Error(error.to_string())
    }
}

impl From<std::io::Error> for SimulationError {
    fn from(error: std::io::Error) -> Self {
        SimulationError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for SimulationError {
    fn from(error: serde_json::Error) -> Self {
        SimulationError::PolicyError(error.to_string())
    }
}

impl From<toml::de::Error> for SimulationError {
    fn from(error: toml::de::Error) -> Self {
        SimulationError::PolicyError(error.to_string())
    }
}
