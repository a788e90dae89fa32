//! Transmission orchestration.
//!
//! Runs one scenario through the pipeline: populate the form-data
//! template, build the envelope, sign it, package it with the attachment,
//! and deliver it. Stages run strictly in order and fail fast; nothing is
//! retained between transmissions.

use crate::config::{Scenario, TransmitterConfig};
use crate::envelope::EnvelopeBuilder;
use crate::error::TransmitError;
use crate::form_data::FormDataPopulator;
use crate::identity::SigningIdentity;
use crate::manifest::Manifest;
use crate::mtom::MtomPackager;
use crate::signer::XmlSigner;
use crate::transport::{TransmissionReceipt, Transport};
use std::fs;
use std::time::Duration;
use tracing::info;

/// One configured transmitter: credential, endpoint, and a reusable HTTP
/// client. Safe to share across concurrent transmissions; the identity is
/// only ever read.
pub struct Transmitter {
    config: TransmitterConfig,
    identity: SigningIdentity,
    client: reqwest::Client,
}

impl Transmitter {
    /// Build a transmitter with its own HTTP client.
    pub fn new(
        config: TransmitterConfig,
        identity: SigningIdentity,
    ) -> Result<Self, TransmitError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            config,
            identity,
            client,
        })
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(
        config: TransmitterConfig,
        identity: SigningIdentity,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            identity,
            client,
        }
    }

    /// Run one scenario end to end and return the raw endpoint response.
    pub async fn transmit(
        &self,
        scenario: &Scenario,
    ) -> Result<TransmissionReceipt, TransmitError> {
        info!(scenario = %scenario.name, "starting transmission");

        let manifest_xml = fs::read_to_string(&scenario.manifest_path)?;
        let manifest = Manifest::parse(&manifest_xml)?;

        let template = fs::read_to_string(&scenario.form_data_path)?;
        let file_name = scenario
            .form_data_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "form_data.xml".to_string());

        let payload = FormDataPopulator::new(&manifest).populate(&template, &file_name)?;
        info!(
            bytes = payload.byte_len(),
            checksum = %payload.checksum_base64(),
            "form data populated"
        );

        let built = EnvelopeBuilder::new(&manifest, &self.config.tcc, self.config.profile)
            .build(&payload)?;
        info!(transmission_id = %built.transmission_id, "envelope built");

        let signed = XmlSigner::new(&self.identity, self.config.profile).sign(&built)?;

        let package = MtomPackager::package(&signed, &payload, &built.attachment_cid)?;
        info!(
            multipart_bytes = package.bytes.len(),
            boundary = %package.boundary,
            "package assembled"
        );

        let transport = Transport::new(self.client.clone(), &self.config.submission_endpoint);
        let receipt = transport.send(&package).await?;
        info!(
            scenario = %scenario.name,
            status = receipt.status,
            "transmission delivered"
        );
        Ok(receipt)
    }
}
