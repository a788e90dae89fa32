//! SOAP envelope construction for AIR bulk transmissions.
//!
//! Builds the canonical envelope tree from the scenario manifest and the
//! frozen attachment payload: WS-Security timestamp, transmitter manifest
//! detail, business header, and a body that references the attachment
//! through an XOP include. Fragments destined for signing carry `wsu:Id`
//! tokens and declare on themselves every namespace prefix they use, so
//! their serialized bytes are stable whether rendered in-document or
//! canonicalized standalone.

use crate::config::TransmissionProfile;
use crate::error::TransmitError;
use crate::form_data::{strip_ein_separators, AttachmentPayload};
use crate::manifest::Manifest;
use crate::xml::Element;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// SOAP 1.1 envelope namespace.
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// WS-Security extensions namespace.
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
/// WS-Security utility namespace (carrier of `wsu:Id`).
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
/// AIR extension namespace for the processing year.
pub const AIR_EXT_NS: &str = "urn:us:gov:treasury:irs:ext:aca:air:ty25";
/// Business header message namespace.
pub const ACA_BUS_HDR_NS: &str = "urn:us:gov:treasury:irs:msg:acabusinessheader";
/// Security header message namespace.
pub const ACA_SEC_HDR_NS: &str = "urn:us:gov:treasury:irs:msg:acasecurityheader";
/// Bulk request message namespace.
pub const BULK_REQ_NS: &str = "urn:us:gov:treasury:irs:msg:irsacabulkrequesttransmitter";
/// XOP include namespace.
pub const XOP_NS: &str = "http://www.w3.org/2004/08/xop/include";

/// Timestamp format for the WS-Security validity window.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Validity window length for the security timestamp.
const TIMESTAMP_VALIDITY_MINUTES: i64 = 5;

const TRANSMISSION_TYPE_CD: &str = "O";
const TEST_FILE_CD: &str = "T";
const VENDOR_CD: &str = "I";

/// `wsu:Id` tokens assigned to the signable fragments.
#[derive(Debug, Clone)]
pub struct SignedFragmentIds {
    pub timestamp: String,
    /// Present only in profiles that sign more than the timestamp.
    pub manifest_detail: Option<String>,
    pub business_header: Option<String>,
}

impl SignedFragmentIds {
    fn generate(profile: TransmissionProfile) -> Self {
        let extended = profile.signs_header_fragments();
        Self {
            timestamp: format!("TS-{}", Uuid::new_v4().simple()),
            manifest_detail: extended
                .then(|| format!("MANIFEST-{}", Uuid::new_v4().simple())),
            business_header: extended
                .then(|| format!("BUSINESSHEADER-{}", Uuid::new_v4().simple())),
        }
    }
}

/// The built (not yet signed) envelope with the tokens the signer and
/// packager need.
#[derive(Debug, Clone)]
pub struct BuiltEnvelope {
    pub root: Element,
    pub fragment_ids: SignedFragmentIds,
    /// Content identifier referenced from the body's XOP include, without
    /// the `cid:` scheme prefix.
    pub attachment_cid: String,
    pub transmission_id: String,
}

/// Constructs envelope trees from manifest and payload metadata.
pub struct EnvelopeBuilder<'a> {
    manifest: &'a Manifest,
    tcc: &'a str,
    profile: TransmissionProfile,
}

impl<'a> EnvelopeBuilder<'a> {
    pub fn new(manifest: &'a Manifest, tcc: &'a str, profile: TransmissionProfile) -> Self {
        Self {
            manifest,
            tcc,
            profile,
        }
    }

    /// Build a fresh envelope. Deterministic given identical inputs except
    /// for the transmission id, the fragment ids, the attachment content
    /// id, and the timestamp window.
    pub fn build(&self, payload: &AttachmentPayload) -> Result<BuiltEnvelope, TransmitError> {
        self.build_at(payload, Utc::now())
    }

    /// Build with an explicit creation instant for the validity window.
    pub fn build_at(
        &self,
        payload: &AttachmentPayload,
        created: DateTime<Utc>,
    ) -> Result<BuiltEnvelope, TransmitError> {
        let fragment_ids = SignedFragmentIds::generate(self.profile);
        let attachment_cid = format!("{}@aca-air-transmitter", Uuid::new_v4());
        let transmission_id = format!("{}:SYS12:{}::T", Uuid::new_v4(), self.tcc);

        let header = Element::new(Some("soapenv"), "Header")
            .with_child(self.security_header(&fragment_ids, created))
            .with_child(self.manifest_detail(payload, &fragment_ids)?)
            .with_child(self.business_header(&transmission_id, &fragment_ids, created))
            .with_child(self.aca_security_header());

        let body = Element::new(Some("soapenv"), "Body").with_child(
            Element::new(Some("bulkReq"), "ACABulkRequestTransmitter")
                .with_namespace("bulkReq", BULK_REQ_NS)
                .with_child(
                    Element::new(Some("bulkReq"), "BulkExchangeFile").with_child(
                        Element::new(Some("xop"), "Include")
                            .with_namespace("xop", XOP_NS)
                            .with_attr("href", &format!("cid:{attachment_cid}")),
                    ),
                ),
        );

        let root = Element::new(Some("soapenv"), "Envelope")
            .with_namespace("soapenv", SOAP_ENV_NS)
            .with_child(header)
            .with_child(body);

        Ok(BuiltEnvelope {
            root,
            fragment_ids,
            attachment_cid,
            transmission_id,
        })
    }

    /// `wsse:Security` with the timestamp validity window. The signature
    /// and security token are spliced in later by the signer.
    fn security_header(&self, ids: &SignedFragmentIds, created: DateTime<Utc>) -> Element {
        let expires = created + Duration::minutes(TIMESTAMP_VALIDITY_MINUTES);
        Element::new(Some("wsse"), "Security")
            .with_namespace("wsse", WSSE_NS)
            .with_attr_ns("soapenv", "mustUnderstand", "1")
            .with_child(
                Element::new(Some("wsu"), "Timestamp")
                    .with_namespace("wsu", WSU_NS)
                    .with_attr_ns("wsu", "Id", &ids.timestamp)
                    .with_child(
                        Element::new(Some("wsu"), "Created")
                            .with_text(&created.format(TIMESTAMP_FORMAT).to_string()),
                    )
                    .with_child(
                        Element::new(Some("wsu"), "Expires")
                            .with_text(&expires.format(TIMESTAMP_FORMAT).to_string()),
                    ),
            )
    }

    /// `air:ACATransmitterManifestReqDtl`: every manifest-derived field
    /// verbatim except the EIN, which has separators removed.
    fn manifest_detail(
        &self,
        payload: &AttachmentPayload,
        ids: &SignedFragmentIds,
    ) -> Result<Element, TransmitError> {
        let m = self.manifest;

        let mut detail = Element::new(Some("air"), "ACATransmitterManifestReqDtl")
            .with_namespace("air", AIR_EXT_NS);
        if let Some(id) = &ids.manifest_detail {
            detail = detail
                .with_namespace("wsu", WSU_NS)
                .with_attr_ns("wsu", "Id", id);
        }

        let address = Element::new(Some("air"), "MailingAddressGrp").with_child(
            Element::new(Some("air"), "USAddressGrp")
                .with_child(text_el("air", "AddressLine1Txt", m.address_line1()?))
                .with_child(text_el("air", "CityNm", m.city()?))
                .with_child(text_el("air", "USStateCd", m.state()?))
                .with_child(text_el("air", "USZIPCd", m.zip()?)),
        );

        Ok(detail
            .with_child(text_el("air", "PaymentYr", m.payment_year()?))
            .with_child(text_el("air", "PriorYearDataInd", m.prior_year_data_ind()?))
            .with_child(text_el("air", "EIN", &strip_ein_separators(m.ein()?)))
            .with_child(text_el("air", "TransmissionTypeCd", TRANSMISSION_TYPE_CD))
            .with_child(text_el("air", "TestFileCd", TEST_FILE_CD))
            .with_child(
                Element::new(Some("air"), "TransmitterNameGrp").with_child(text_el(
                    "air",
                    "BusinessNameLine1Txt",
                    m.company_name()?,
                )),
            )
            .with_child(
                Element::new(Some("air"), "CompanyInformationGrp")
                    .with_child(text_el("air", "CompanyNm", m.company_name()?))
                    .with_child(address)
                    .with_child(text_el("air", "ContactPhoneNum", m.contact_phone()?)),
            )
            .with_child(
                Element::new(Some("air"), "VendorInformationGrp")
                    .with_child(text_el("air", "VendorCd", VENDOR_CD))
                    .with_child(
                        Element::new(Some("air"), "ContactNameGrp")
                            .with_child(text_el(
                                "air",
                                "PersonFirstNm",
                                m.vendor_contact_first_name()?,
                            ))
                            .with_child(text_el(
                                "air",
                                "PersonLastNm",
                                m.vendor_contact_last_name()?,
                            )),
                    )
                    .with_child(text_el("air", "ContactPhoneNum", m.vendor_contact_phone()?)),
            )
            .with_child(text_el(
                "air",
                "TotalPayeeRecordCnt",
                m.total_payee_record_count()?,
            ))
            .with_child(text_el(
                "air",
                "TotalPayerRecordCnt",
                m.total_payer_record_count()?,
            ))
            .with_child(text_el("air", "SoftwareId", m.software_id()?))
            .with_child(text_el("air", "FormTypeCd", m.form_type()?))
            .with_child(text_el("air", "BinaryFormatCd", AttachmentPayload::MEDIA_TYPE))
            .with_child(text_el(
                "air",
                "ChecksumAugmentationNum",
                &payload.checksum_base64(),
            ))
            .with_child(text_el(
                "air",
                "AttachmentByteSizeNum",
                &payload.byte_len().to_string(),
            ))
            .with_child(text_el("air", "DocumentSystemFileNm", payload.file_name())))
    }

    /// `acaBusHdr:ACABusinessHeader` with the unique transmission id.
    fn business_header(
        &self,
        transmission_id: &str,
        ids: &SignedFragmentIds,
        created: DateTime<Utc>,
    ) -> Element {
        let mut header = Element::new(Some("acaBusHdr"), "ACABusinessHeader")
            .with_namespace("acaBusHdr", ACA_BUS_HDR_NS)
            .with_namespace("air", AIR_EXT_NS);
        if let Some(id) = &ids.business_header {
            header = header
                .with_namespace("wsu", WSU_NS)
                .with_attr_ns("wsu", "Id", id);
        }
        header
            .with_child(text_el("air", "UniqueTransmissionId", transmission_id))
            .with_child(text_el(
                "air",
                "Timestamp",
                &created.format(TIMESTAMP_FORMAT).to_string(),
            ))
    }

    /// User block carrying the transmitter control code.
    fn aca_security_header(&self) -> Element {
        Element::new(Some("acaSecHdr"), "ACASecurityHeader")
            .with_namespace("acaSecHdr", ACA_SEC_HDR_NS)
            .with_child(text_el("acaSecHdr", "UserId", self.tcc))
    }
}

fn text_el(prefix: &str, local: &str, text: &str) -> Element {
    Element::new(Some(prefix), local).with_text(text)
}
