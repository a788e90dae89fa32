//! Configuration types for the AIR transmitter.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitterConfig {
    /// Path to the signing certificate (PEM).
    pub certificate_path: PathBuf,

    /// Path to the PKCS#8 private key (PEM), optionally encrypted.
    pub private_key_path: PathBuf,

    /// Passphrase for an encrypted private key.
    #[serde(default)]
    pub private_key_password: Option<String>,

    /// Transmitter Control Code assigned by the IRS.
    pub tcc: String,

    /// AIR submission endpoint URL.
    pub submission_endpoint: String,

    /// Which envelope fragments are signed.
    #[serde(default)]
    pub profile: TransmissionProfile,

    /// Timeout for the submission request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Scenarios to transmit, in order.
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// One transmission scenario: a form-data template plus its manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Display name used in logs.
    pub name: String,

    /// Path to the form-data template document.
    pub form_data_path: PathBuf,

    /// Path to the scenario manifest document.
    pub manifest_path: PathBuf,
}

/// Transmission profile: which envelope fragments carry signature
/// references. Selected once per deployment, not per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionProfile {
    /// Sign only the WS-Security timestamp.
    TimestampOnly,
    /// Sign the timestamp plus the manifest-detail and business-header
    /// fragments.
    #[default]
    Extended,
}

impl TransmissionProfile {
    /// Whether the manifest-detail and business-header fragments are part
    /// of the signature reference set.
    pub fn signs_header_fragments(&self) -> bool {
        matches!(self, Self::Extended)
    }
}
