//! Error types for the AIR bulk transmitter.

use thiserror::Error;

/// Errors raised by the transmission pipeline.
///
/// Every stage fails fast: the first error aborts the transmission with no
/// recovery or partial output. `Template` errors are raised before any
/// network activity occurs.
#[derive(Error, Debug)]
pub enum TransmitError {
    /// A required manifest field was missing or invalid during form-data
    /// population or envelope construction.
    #[error("template population failed: {0}")]
    Template(String),

    /// An expected XML fragment or signature reference target was not found
    /// while signing the envelope.
    #[error("envelope structure invalid: {0}")]
    Structure(String),

    /// The signing key or certificate could not be loaded or used.
    #[error("signing credential unusable: {0}")]
    Credential(String),

    /// The HTTP request could not be completed.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status. The raw response body is
    /// carried verbatim for the caller.
    #[error("endpoint rejected transmission with HTTP {status}")]
    Rejected { status: u16, body: String },

    /// A local file (manifest, template, credential) could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransmitError {
    /// Short stage tag for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Template(_) => "populate",
            Self::Structure(_) => "sign",
            Self::Credential(_) => "credentials",
            Self::Transport(_) | Self::Rejected { .. } => "transport",
            Self::Io(_) => "io",
        }
    }
}
