//! HTTP delivery of the packaged transmission.
//!
//! One gzip-compressed POST per invocation. The response body is returned
//! verbatim; nothing is parsed, nothing is retried.

use crate::error::TransmitError;
use crate::mtom::{MtomPackage, ENVELOPE_CONTENT_ID, ENVELOPE_MEDIA_TYPE, START_INFO};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use tracing::{debug, info};

/// SOAP action header value for the bulk submission operation.
pub const SOAP_ACTION: &str = "BulkRequestTransmitter";

/// Raw outcome of a delivered transmission.
#[derive(Debug, Clone)]
pub struct TransmissionReceipt {
    pub status: u16,
    pub body: String,
}

/// Delivers packaged transmissions to the submission endpoint.
///
/// Holds an explicitly passed client handle; connection reuse is whatever
/// the client already provides.
pub struct Transport {
    client: reqwest::Client,
    endpoint: String,
}

impl Transport {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Compress and POST the package. Exactly one request is sent; any
    /// transport-level failure or non-2xx status is surfaced verbatim.
    pub async fn send(&self, package: &MtomPackage) -> Result<TransmissionReceipt, TransmitError> {
        let compressed = gzip(&package.bytes)?;
        debug!(
            raw_bytes = package.bytes.len(),
            compressed_bytes = compressed.len(),
            "compressed multipart body"
        );

        let content_type = format!(
            "multipart/related; boundary=\"{}\"; type=\"{ENVELOPE_MEDIA_TYPE}\"; \
             start=\"<{ENVELOPE_CONTENT_ID}>\"; start-info=\"{START_INFO}\"",
            package.boundary
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", content_type)
            .header("Content-Encoding", "gzip")
            .header("SOAPAction", format!("\"{SOAP_ACTION}\""))
            .body(compressed)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        info!(status = status.as_u16(), bytes = body.len(), "endpoint responded");

        if !status.is_success() {
            return Err(TransmitError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(TransmissionReceipt {
            status: status.as_u16(),
            body,
        })
    }
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>, TransmitError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}
