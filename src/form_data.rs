//! Form-data template population and attachment payload.
//!
//! The bulk attachment starts life as a textual template with named
//! placeholders. Population substitutes filer values from the manifest and
//! freezes the result into an [`AttachmentPayload`] whose SHA-256 digest
//! and byte length always describe exactly the frozen bytes.

use crate::error::TransmitError;
use crate::manifest::Manifest;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Number of leading company-name characters in the name control.
pub const NAME_CONTROL_LEN: usize = 4;

/// The populated attachment: bytes plus their digest and declared media
/// type. Immutable once constructed; re-population produces a new value.
#[derive(Debug, Clone)]
pub struct AttachmentPayload {
    bytes: Vec<u8>,
    digest: [u8; 32],
    file_name: String,
}

impl AttachmentPayload {
    /// MIME media type declared for the attachment part.
    pub const MEDIA_TYPE: &'static str = "application/xml";

    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        let digest = Sha256::digest(&bytes).into();
        Self {
            bytes,
            digest,
            file_name: file_name.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Base64 form of the SHA-256 digest, as embedded in the envelope's
    /// checksum field.
    pub fn checksum_base64(&self) -> String {
        BASE64.encode(self.digest)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// Fills the attachment template with filer-specific values.
pub struct FormDataPopulator<'a> {
    manifest: &'a Manifest,
}

impl<'a> FormDataPopulator<'a> {
    pub fn new(manifest: &'a Manifest) -> Self {
        Self { manifest }
    }

    /// Substitute the placeholder set and freeze the result. Placeholders
    /// outside the known set are left untouched. Fails if a required
    /// manifest field is absent; no input is mutated.
    pub fn populate(
        &self,
        template: &str,
        file_name: &str,
    ) -> Result<AttachmentPayload, TransmitError> {
        let company = self.manifest.company_name()?;
        let substitutions = [
            ("{{COMPANY_NAME}}", company.to_string()),
            ("{{NAME_CONTROL}}", name_control(company)),
            ("{{EIN}}", strip_ein_separators(self.manifest.ein()?)),
            ("{{ADDRESS_LINE1}}", self.manifest.address_line1()?.to_string()),
            ("{{CITY}}", self.manifest.city()?.to_string()),
            ("{{STATE}}", self.manifest.state()?.to_string()),
            ("{{ZIP}}", self.manifest.zip()?.to_string()),
            (
                "{{CONTACT_FIRST_NAME}}",
                self.manifest.vendor_contact_first_name()?.to_string(),
            ),
            (
                "{{CONTACT_LAST_NAME}}",
                self.manifest.vendor_contact_last_name()?.to_string(),
            ),
        ];

        let mut populated = template.to_string();
        for (token, value) in &substitutions {
            populated = populated.replace(token, value);
        }

        Ok(AttachmentPayload::new(populated.into_bytes(), file_name))
    }
}

/// Derive the filer name control: the first four characters of the company
/// name, upper-cased. Names shorter than four characters use the entire
/// name upper-cased.
pub fn name_control(company_name: &str) -> String {
    company_name
        .chars()
        .take(NAME_CONTROL_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// Remove separator characters from an employer identification number,
/// keeping digits only.
pub fn strip_ein_separators(ein: &str) -> String {
    ein.chars().filter(char::is_ascii_digit).collect()
}
