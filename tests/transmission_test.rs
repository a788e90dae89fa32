//! Integration tests for the aca-air-transmitter crate.
//!
//! These tests exercise the public API surface end-to-end, combining
//! manifest parsing, form-data population, envelope construction,
//! signing, MTOM packaging, and transport against a loopback endpoint.

use aca_air_transmitter::config::{Scenario, TransmissionProfile, TransmitterConfig};
use aca_air_transmitter::envelope::EnvelopeBuilder;
use aca_air_transmitter::error::TransmitError;
use aca_air_transmitter::form_data::FormDataPopulator;
use aca_air_transmitter::identity::SigningIdentity;
use aca_air_transmitter::manifest::Manifest;
use aca_air_transmitter::mtom::MtomPackager;
use aca_air_transmitter::signer::{GenericIdLookup, IdResolver, KnownElementLookup, XmlSigner, DS_NS};
use aca_air_transmitter::transmitter::Transmitter;
use aca_air_transmitter::xml::{exclusive_c14n, inherited_scope};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs1v15::VerifyingKey;
use rsa::sha2::Sha256;
use rsa::signature::Verifier;
use rsa::RsaPrivateKey;
use sha2::Digest;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ============================================================================
// Fixtures
// ============================================================================

const MANIFEST_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ACATransmissionManifest>
  <PaymentYr>2025</PaymentYr>
  <PriorYearDataInd>0</PriorYearDataInd>
  <TransmitterInfo>
    <EIN>12-3456789</EIN>
  </TransmitterInfo>
  <CompanyInformation>
    <CompanyName>ACME INDUSTRIES</CompanyName>
    <MailingAddress>
      <AddressLine1>100 MAIN ST</AddressLine1>
      <City>SPRINGFIELD</City>
      <State>IL</State>
      <Zip>62704</Zip>
    </MailingAddress>
    <ContactPhone>5551234567</ContactPhone>
  </CompanyInformation>
  <VendorInformation>
    <ContactFirstName>Jane</ContactFirstName>
    <ContactLastName>Smith</ContactLastName>
    <ContactPhone>5559876543</ContactPhone>
  </VendorInformation>
  <TotalPayeeRecordCnt>2</TotalPayeeRecordCnt>
  <TotalPayerRecordCnt>1</TotalPayerRecordCnt>
  <SoftwareId>25A0000000</SoftwareId>
  <FormType>1094/1095B</FormType>
</ACATransmissionManifest>"#;

const FORM_TEMPLATE: &str = r#"<Form109495BTransmittalUpstream>
  <CompanyName>{{COMPANY_NAME}}</CompanyName>
  <CompanyNameControl>{{NAME_CONTROL}}</CompanyNameControl>
  <EmployerEIN>{{EIN}}</EmployerEIN>
  <MailingAddress>{{ADDRESS_LINE1}}</MailingAddress>
  <City>{{CITY}}</City>
  <State>{{STATE}}</State>
  <Zip>{{ZIP}}</Zip>
  <ContactName>{{CONTACT_FIRST_NAME}} {{CONTACT_LAST_NAME}}</ContactName>
</Form109495BTransmittalUpstream>"#;

fn test_identity() -> SigningIdentity {
    let mut rng = rand::thread_rng();
    let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    SigningIdentity::from_parts(b"certificate-der-bytes".to_vec(), key)
}

fn config_for(endpoint: &str, dir: &std::path::Path) -> (TransmitterConfig, Scenario) {
    let scenario = Scenario {
        name: "scenario-2".to_string(),
        form_data_path: dir.join("form_data.xml"),
        manifest_path: dir.join("manifest.xml"),
    };
    let config = TransmitterConfig {
        certificate_path: dir.join("cert.pem"),
        private_key_path: dir.join("key.pem"),
        private_key_password: None,
        tcc: "AAAAA".to_string(),
        submission_endpoint: endpoint.to_string(),
        profile: TransmissionProfile::Extended,
        request_timeout_secs: 5,
        scenarios: vec![scenario.clone()],
    };
    (config, scenario)
}

/// Minimal loopback HTTP endpoint: accepts one connection, reads one
/// request, answers 200 with the given body, and hands back the raw
/// request bytes.
fn one_shot_endpoint(
    listener: TcpListener,
    response_body: &'static str,
) -> tokio::task::JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_http_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            response_body.len(),
            response_body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
        request
    })
}

/// Read one full HTTP request (headers plus content-length body) from the
/// stream.
async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut buf).await.unwrap();
        request.extend_from_slice(&buf[..n]);
        if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let headers = String::from_utf8_lossy(&request[..header_end]).to_string();
    let content_length: usize = headers
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0);
    while request.len() < header_end + content_length {
        let n = stream.read(&mut buf).await.unwrap();
        request.extend_from_slice(&buf[..n]);
    }
    request
}

// ============================================================================
// End-to-end: populate + build + sign + package (offline)
// ============================================================================

#[test]
fn test_e2e_acme_scenario_values() {
    let manifest = Manifest::parse(MANIFEST_XML).unwrap();
    let payload = FormDataPopulator::new(&manifest)
        .populate(FORM_TEMPLATE, "1094B_Request_AAAAA_20260115.xml")
        .unwrap();

    let text = String::from_utf8(payload.bytes().to_vec()).unwrap();
    assert!(text.contains("<CompanyNameControl>ACME</CompanyNameControl>"));
    assert!(text.contains("<EmployerEIN>123456789</EmployerEIN>"));
    assert!(text.contains("<MailingAddress>100 MAIN ST</MailingAddress>"));
    assert!(text.contains("<City>SPRINGFIELD</City>"));
    assert!(text.contains("<State>IL</State>"));
    assert!(text.contains("<Zip>62704</Zip>"));

    let built = EnvelopeBuilder::new(&manifest, "AAAAA", TransmissionProfile::Extended)
        .build(&payload)
        .unwrap();

    // The checksum field must equal the SHA-256 of the exact populated
    // bytes, and the length field the exact byte count.
    let expected_checksum = BASE64.encode(sha2::Sha256::digest(payload.bytes()));
    let detail = built
        .root
        .find_descendant("ACATransmitterManifestReqDtl")
        .unwrap();
    assert_eq!(
        detail
            .find_child("ChecksumAugmentationNum")
            .unwrap()
            .text_content(),
        expected_checksum
    );
    assert_eq!(
        detail
            .find_child("AttachmentByteSizeNum")
            .unwrap()
            .text_content(),
        payload.byte_len().to_string()
    );
}

#[test]
fn test_e2e_package_binds_attachment_by_cid() {
    let manifest = Manifest::parse(MANIFEST_XML).unwrap();
    let payload = FormDataPopulator::new(&manifest)
        .populate(FORM_TEMPLATE, "req.xml")
        .unwrap();
    let built = EnvelopeBuilder::new(&manifest, "AAAAA", TransmissionProfile::Extended)
        .build(&payload)
        .unwrap();
    let identity = test_identity();
    let signed = XmlSigner::new(&identity, TransmissionProfile::Extended)
        .sign(&built)
        .unwrap();
    let package = MtomPackager::package(&signed, &payload, &built.attachment_cid).unwrap();

    let text = String::from_utf8_lossy(&package.bytes);
    assert!(text.contains(&format!("href=\"cid:{}\"", built.attachment_cid)));
    assert!(text.contains(&format!("Content-ID: <{}>", built.attachment_cid)));

    // The boundary token never occurs inside either part's content.
    let occurrences = text.matches(&package.boundary).count();
    assert_eq!(occurrences, 3, "boundary must appear exactly at the three separators");
}

#[test]
fn test_e2e_signature_verifies_for_declared_reference_set() {
    let manifest = Manifest::parse(MANIFEST_XML).unwrap();
    let payload = FormDataPopulator::new(&manifest)
        .populate(FORM_TEMPLATE, "req.xml")
        .unwrap();

    for profile in [TransmissionProfile::TimestampOnly, TransmissionProfile::Extended] {
        let built = EnvelopeBuilder::new(&manifest, "AAAAA", profile)
            .build(&payload)
            .unwrap();
        let identity = test_identity();
        let signed = XmlSigner::new(&identity, profile).sign(&built).unwrap();

        let signed_info = signed.find_descendant("SignedInfo").unwrap();
        let expected_refs = if profile.signs_header_fragments() { 3 } else { 1 };
        let references: Vec<_> = signed_info
            .child_elements()
            .filter(|e| e.local() == "Reference")
            .collect();
        assert_eq!(references.len(), expected_refs);

        // Independently re-resolve and re-digest every declared reference.
        for reference in &references {
            let id = reference.attr_local("URI").unwrap().strip_prefix('#').unwrap();
            let enveloped = reference
                .find_descendant("Transforms")
                .unwrap()
                .child_elements()
                .any(|t| {
                    t.attr_local("Algorithm")
                        == Some("http://www.w3.org/2000/09/xmldsig#enveloped-signature")
                });
            let target = GenericIdLookup
                .resolve(&signed, id)
                .or_else(|| KnownElementLookup.resolve(&signed, id))
                .expect("declared reference must resolve");
            let scope = inherited_scope(&signed, target).unwrap();
            let canonical = exclusive_c14n(target, &scope, enveloped);
            let digest = BASE64.encode(sha2::Sha256::digest(canonical.as_bytes()));
            assert_eq!(
                digest,
                reference.find_descendant("DigestValue").unwrap().text_content()
            );
        }

        // And verify the signature itself over the re-canonicalized
        // SignedInfo with the public half of the key.
        let ds_scope = vec![("ds".to_string(), DS_NS.to_string())];
        let canonical = exclusive_c14n(signed_info, &ds_scope, false);
        let signature_bytes = BASE64
            .decode(signed.find_descendant("SignatureValue").unwrap().text_content())
            .unwrap();
        let verifying_key = VerifyingKey::<Sha256>::new(identity.private_key().to_public_key());
        let signature = rsa::pkcs1v15::Signature::try_from(signature_bytes.as_slice()).unwrap();
        verifying_key
            .verify(canonical.as_bytes(), &signature)
            .expect("signature must verify");
    }
}

#[test]
fn test_e2e_tampered_fragment_fails_verification() {
    let manifest = Manifest::parse(MANIFEST_XML).unwrap();
    let payload = FormDataPopulator::new(&manifest)
        .populate(FORM_TEMPLATE, "req.xml")
        .unwrap();
    let built = EnvelopeBuilder::new(&manifest, "AAAAA", TransmissionProfile::Extended)
        .build(&payload)
        .unwrap();
    let identity = test_identity();
    let mut signed = XmlSigner::new(&identity, TransmissionProfile::Extended)
        .sign(&built)
        .unwrap();

    // Flip one byte inside a referenced fragment after signing.
    let detail = signed
        .find_descendant_mut("ACATransmitterManifestReqDtl")
        .unwrap();
    let year = detail.find_child_mut("PaymentYr").unwrap();
    *year = aca_air_transmitter::xml::Element::new(Some("air"), "PaymentYr").with_text("2026");

    let id = built.fragment_ids.manifest_detail.as_deref().unwrap();
    let target = KnownElementLookup.resolve(&signed, id).unwrap();
    let scope = inherited_scope(&signed, target).unwrap();
    let recomputed = BASE64.encode(sha2::Sha256::digest(
        exclusive_c14n(target, &scope, false).as_bytes(),
    ));
    let declared = signed
        .find_descendant("SignedInfo")
        .unwrap()
        .child_elements()
        .filter(|e| e.local() == "Reference")
        .find(|r| r.attr_local("URI") == Some(format!("#{id}").as_str()))
        .unwrap()
        .find_descendant("DigestValue")
        .unwrap()
        .text_content();
    assert_ne!(recomputed, declared, "tampering must break the declared digest");
}

// ============================================================================
// End-to-end: transport against a loopback endpoint
// ============================================================================

#[tokio::test]
async fn test_e2e_transmit_delivers_gzipped_multipart() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("manifest.xml"), MANIFEST_XML).unwrap();
    std::fs::write(dir.path().join("form_data.xml"), FORM_TEMPLATE).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let server = one_shot_endpoint(listener, "<TransmissionAck>Processing</TransmissionAck>");

    let (config, scenario) = config_for(&endpoint, dir.path());
    let transmitter = Transmitter::with_client(
        config,
        test_identity(),
        reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap(),
    );

    let receipt = transmitter.transmit(&scenario).await.unwrap();
    assert_eq!(receipt.status, 200);
    assert_eq!(receipt.body, "<TransmissionAck>Processing</TransmissionAck>");

    let request = server.await.unwrap();
    let headers_end = request.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    let headers = String::from_utf8_lossy(&request[..headers_end]).to_lowercase();
    assert!(headers.contains("content-encoding: gzip"));
    assert!(headers.contains("multipart/related"));
    assert!(headers.contains("type=\"application/xop+xml\""));
    assert!(headers.contains("start-info=\"text/xml\""));
    assert!(headers.contains("soapaction: \"bulkrequesttransmitter\""));

    // The body must be a gzip stream wrapping the multipart message.
    use flate2::read::GzDecoder;
    use std::io::Read;
    let mut decoder = GzDecoder::new(&request[headers_end..]);
    let mut multipart = Vec::new();
    decoder.read_to_end(&mut multipart).unwrap();
    let multipart = String::from_utf8_lossy(&multipart);
    assert!(multipart.contains("Content-Transfer-Encoding: binary"));
    assert!(multipart.contains("<CompanyNameControl>ACME</CompanyNameControl>"));
    assert!(multipart.contains("BinarySecurityToken"));
}

#[tokio::test]
async fn test_e2e_missing_ein_aborts_before_any_network_activity() {
    let dir = tempfile::tempdir().unwrap();
    let broken = MANIFEST_XML.replace("<EIN>12-3456789</EIN>", "");
    std::fs::write(dir.path().join("manifest.xml"), broken).unwrap();
    std::fs::write(dir.path().join("form_data.xml"), FORM_TEMPLATE).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());

    let (config, scenario) = config_for(&endpoint, dir.path());
    let transmitter = Transmitter::with_client(
        config,
        test_identity(),
        reqwest::Client::new(),
    );

    let err = transmitter.transmit(&scenario).await.unwrap_err();
    assert!(matches!(err, TransmitError::Template(_)));
    assert!(err.to_string().contains("EIN"));

    // The endpoint must never have been contacted.
    let accepted =
        tokio::time::timeout(Duration::from_millis(250), listener.accept()).await;
    assert!(accepted.is_err(), "no connection may reach the endpoint");
}

#[tokio::test]
async fn test_e2e_non_success_status_surfaced_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("manifest.xml"), MANIFEST_XML).unwrap();
    std::fs::write(dir.path().join("form_data.xml"), FORM_TEMPLATE).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_http_request(&mut stream).await;
        let body = "<Fault>TPE1105</Fault>";
        let response = format!(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    });

    let (config, scenario) = config_for(&endpoint, dir.path());
    let transmitter = Transmitter::with_client(config, test_identity(), reqwest::Client::new());

    let err = transmitter.transmit(&scenario).await.unwrap_err();
    match err {
        TransmitError::Rejected { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "<Fault>TPE1105</Fault>");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

// ============================================================================
// Pipeline determinism
// ============================================================================

#[test]
fn test_repeat_runs_identical_modulo_generated_identifiers() {
    let manifest = Manifest::parse(MANIFEST_XML).unwrap();
    let populator = FormDataPopulator::new(&manifest);
    let a = populator.populate(FORM_TEMPLATE, "req.xml").unwrap();
    let b = populator.populate(FORM_TEMPLATE, "req.xml").unwrap();
    assert_eq!(a.bytes(), b.bytes());
    assert_eq!(a.checksum_base64(), b.checksum_base64());

    let builder = EnvelopeBuilder::new(&manifest, "AAAAA", TransmissionProfile::Extended);
    let created = chrono::DateTime::parse_from_rfc3339("2026-01-15T10:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let built_a = builder.build_at(&a, created).unwrap();
    let built_b = builder.build_at(&b, created).unwrap();

    let scrub = |built: &aca_air_transmitter::envelope::BuiltEnvelope| {
        built
            .root
            .to_canonical_xml()
            .replace(&built.transmission_id, "UTID")
            .replace(&built.fragment_ids.timestamp, "TS")
            .replace(built.fragment_ids.manifest_detail.as_deref().unwrap(), "MD")
            .replace(built.fragment_ids.business_header.as_deref().unwrap(), "BH")
            .replace(&built.attachment_cid, "CID")
    };
    assert_eq!(scrub(&built_a), scrub(&built_b));
}

// ============================================================================
// AttachmentPayload integrity
// ============================================================================

#[test]
fn test_payload_digest_always_matches_packaged_bytes() {
    let manifest = Manifest::parse(MANIFEST_XML).unwrap();
    let payload = FormDataPopulator::new(&manifest)
        .populate(FORM_TEMPLATE, "req.xml")
        .unwrap();
    let recomputed: [u8; 32] = sha2::Sha256::digest(payload.bytes()).into();
    assert_eq!(payload.digest(), &recomputed);

    let built = EnvelopeBuilder::new(&manifest, "AAAAA", TransmissionProfile::Extended)
        .build(&payload)
        .unwrap();
    let identity = test_identity();
    let signed = XmlSigner::new(&identity, TransmissionProfile::Extended)
        .sign(&built)
        .unwrap();
    let package = MtomPackager::package(&signed, &payload, &built.attachment_cid).unwrap();

    // The attachment part inside the package carries the exact bytes the
    // digest describes.
    assert!(package
        .bytes
        .windows(payload.bytes().len())
        .any(|w| w == payload.bytes()));
}
