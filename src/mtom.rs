//! MTOM/XOP multipart packaging.
//!
//! Serializes the signed envelope as the root MIME part and the raw
//! attachment bytes as a second part, bound together by the content
//! identifier referenced from the envelope body. The envelope part is
//! rendered with the same canonical serializer the signer digested
//! against, so packaging never alters the signed bytes.

use crate::error::TransmitError;
use crate::form_data::AttachmentPayload;
use crate::xml::Element;
use rand::Rng;

/// Fixed content identifier of the envelope (root) part.
pub const ENVELOPE_CONTENT_ID: &str = "rootpart@aca-air-transmitter";

/// Media type of the envelope part.
pub const ENVELOPE_MEDIA_TYPE: &str = "application/xop+xml";

/// Underlying media type the XOP part carries.
pub const START_INFO: &str = "text/xml";

/// A finished multipart message.
#[derive(Debug, Clone)]
pub struct MtomPackage {
    pub bytes: Vec<u8>,
    pub boundary: String,
}

/// Packages signed envelopes with their attachments.
pub struct MtomPackager;

impl MtomPackager {
    /// Build the multipart body. `attachment_cid` is the bare content
    /// identifier token referenced from the envelope body (no `cid:`
    /// scheme, no angle brackets).
    pub fn package(
        envelope: &Element,
        payload: &AttachmentPayload,
        attachment_cid: &str,
    ) -> Result<MtomPackage, TransmitError> {
        let envelope_xml = envelope.to_document();

        // The envelope must reference the attachment part it is packaged
        // with; a mismatch here would produce an unprocessable message.
        if !envelope_xml.contains(&format!("cid:{attachment_cid}")) {
            return Err(TransmitError::Structure(format!(
                "envelope does not reference attachment cid:{attachment_cid}"
            )));
        }

        let boundary = unique_boundary(envelope_xml.as_bytes(), payload.bytes());

        let mut bytes = Vec::with_capacity(envelope_xml.len() + payload.byte_len() + 512);
        bytes.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        bytes.extend_from_slice(
            format!(
                "Content-Type: {ENVELOPE_MEDIA_TYPE}; charset=UTF-8; type=\"{START_INFO}\"\r\n\
                 Content-Transfer-Encoding: 8bit\r\n\
                 Content-ID: <{ENVELOPE_CONTENT_ID}>\r\n\r\n"
            )
            .as_bytes(),
        );
        bytes.extend_from_slice(envelope_xml.as_bytes());
        bytes.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
        bytes.extend_from_slice(
            format!(
                "Content-Type: {}\r\n\
                 Content-Transfer-Encoding: binary\r\n\
                 Content-ID: <{attachment_cid}>\r\n\
                 Content-Disposition: attachment; filename=\"{}\"\r\n\r\n",
                AttachmentPayload::MEDIA_TYPE,
                payload.file_name()
            )
            .as_bytes(),
        );
        bytes.extend_from_slice(payload.bytes());
        bytes.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Ok(MtomPackage { bytes, boundary })
    }
}

/// Generate a boundary token that occurs in neither part's content.
fn unique_boundary(envelope: &[u8], attachment: &[u8]) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let token: String = (0..24)
            .map(|_| {
                const HEX: &[u8] = b"0123456789abcdef";
                HEX[rng.gen_range(0..HEX.len())] as char
            })
            .collect();
        let boundary = format!("MIMEBoundary_{token}");
        if !contains(envelope, boundary.as_bytes()) && !contains(attachment, boundary.as_bytes()) {
            return boundary;
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
