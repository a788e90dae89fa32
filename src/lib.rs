//! ACA AIR bulk transmitter
//!
//! Builds, signs, and submits a single ACA Information Returns bulk
//! transmission: a SOAP 1.1 envelope with a WS-Security signed header
//! set, an MTOM/XOP-bound form-data attachment, gzip compression, and one
//! HTTP POST to the submission endpoint.
//!
//! # Pipeline
//!
//! - Form-data population (placeholder substitution, checksum freeze)
//! - Envelope construction (manifest detail, business header, timestamp)
//! - XML digital signing (exclusive C14N, SHA-256, RSA-SHA256)
//! - MTOM packaging (multipart/related with content-id binding)
//! - Transport (gzip + POST, raw response returned)
//!
//! # Example
//!
//! ```ignore
//! use aca_air_transmitter::{SigningIdentity, Transmitter, TransmitterConfig};
//!
//! let config: TransmitterConfig = serde_yaml::from_str(&yaml)?;
//! let identity = SigningIdentity::load(
//!     &config.certificate_path,
//!     &config.private_key_path,
//!     config.private_key_password.as_deref(),
//! )?;
//! let transmitter = Transmitter::new(config.clone(), identity)?;
//! for scenario in &config.scenarios {
//!     let receipt = transmitter.transmit(scenario).await?;
//!     println!("{}", receipt.body);
//! }
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod form_data;
pub mod identity;
pub mod manifest;
pub mod mtom;
pub mod signer;
pub mod transmitter;
pub mod transport;
pub mod xml;

pub use config::{Scenario, TransmissionProfile, TransmitterConfig};
pub use error::TransmitError;
pub use identity::SigningIdentity;
pub use transmitter::Transmitter;
pub use transport::TransmissionReceipt;
