//! XML digital signing of the envelope's security header.
//!
//! Signing is a pure transform: the built envelope goes in, a new tree
//! with the security token and signature spliced into `wsse:Security`
//! comes out. Reference targets are resolved through a pluggable id
//! resolver chain, canonicalized with exclusive C14N, digested with
//! SHA-256, and the `ds:SignedInfo` structure is signed RSA-SHA256.

use crate::config::TransmissionProfile;
use crate::envelope::{BuiltEnvelope, WSSE_NS, WSU_NS};
use crate::error::TransmitError;
use crate::identity::SigningIdentity;
use crate::xml::{exclusive_c14n, inherited_scope, Element};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs1v15::SigningKey;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::Digest;
use tracing::debug;
use uuid::Uuid;

/// XML-DSig namespace.
pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Algorithm URIs.
pub const EXC_C14N_ALGORITHM: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const ENVELOPED_SIGNATURE_TRANSFORM: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub const RSA_SHA256_ALGORITHM: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const SHA256_DIGEST_ALGORITHM: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// WS-Security token profile URIs.
pub const X509V3_VALUE_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
pub const BASE64_ENCODING_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// Element local names allowed to carry a signature reference id.
const SIGNABLE_ELEMENTS: &[&str] = &[
    "Timestamp",
    "ACATransmitterManifestReqDtl",
    "ACABusinessHeader",
];

/// Resolves a signature reference id to an element in the tree.
pub trait IdResolver {
    fn resolve<'a>(&self, root: &'a Element, id: &str) -> Option<&'a Element>;
}

/// Standard lookup: the first element carrying an `Id` attribute (any
/// prefix) equal to the requested value.
pub struct GenericIdLookup;

impl IdResolver for GenericIdLookup {
    fn resolve<'a>(&self, root: &'a Element, id: &str) -> Option<&'a Element> {
        fn walk<'a>(el: &'a Element, id: &str) -> Option<&'a Element> {
            if el.attributes().iter().any(|a| {
                a.prefix.is_none() && a.local == "Id" && a.value == id
            }) {
                return Some(el);
            }
            el.child_elements().find_map(|c| walk(c, id))
        }
        walk(root, id)
    }
}

/// Fallback lookup for ids declared in the WS-Security utility namespace:
/// only the known signable elements are searched, and only their `wsu:Id`
/// attribute is consulted. This guards against a generic lookup matching
/// the wrong element when the id attribute lives in a non-default
/// namespace.
pub struct KnownElementLookup;

impl IdResolver for KnownElementLookup {
    fn resolve<'a>(&self, root: &'a Element, id: &str) -> Option<&'a Element> {
        fn walk<'a>(el: &'a Element, id: &str) -> Option<&'a Element> {
            if SIGNABLE_ELEMENTS.contains(&el.local())
                && el.attributes().iter().any(|a| {
                    a.prefix.as_deref() == Some("wsu") && a.local == "Id" && a.value == id
                })
            {
                return Some(el);
            }
            el.child_elements().find_map(|c| walk(c, id))
        }
        walk(root, id)
    }
}

/// Signs envelopes with the transmitter's credential.
pub struct XmlSigner<'a> {
    identity: &'a SigningIdentity,
    profile: TransmissionProfile,
    resolvers: Vec<Box<dyn IdResolver>>,
}

impl<'a> XmlSigner<'a> {
    /// Signer with the default resolver chain: generic lookup first, then
    /// the allow-listed fallback.
    pub fn new(identity: &'a SigningIdentity, profile: TransmissionProfile) -> Self {
        Self {
            identity,
            profile,
            resolvers: vec![Box::new(GenericIdLookup), Box::new(KnownElementLookup)],
        }
    }

    /// Replace the resolver chain.
    pub fn with_resolvers(mut self, resolvers: Vec<Box<dyn IdResolver>>) -> Self {
        self.resolvers = resolvers;
        self
    }

    fn resolve_id<'t>(&self, root: &'t Element, id: &str) -> Option<&'t Element> {
        self.resolvers.iter().find_map(|r| r.resolve(root, id))
    }

    /// Produce a signed copy of the envelope. The input is not mutated.
    pub fn sign(&self, built: &BuiltEnvelope) -> Result<Element, TransmitError> {
        let mut root = built.root.clone();

        // The security header and its timestamp must already exist.
        {
            let security = root
                .find_descendant_mut("Security")
                .ok_or_else(|| TransmitError::Structure("wsse:Security header not found".into()))?;
            let timestamp = security.find_child_mut("Timestamp").ok_or_else(|| {
                TransmitError::Structure("wsu:Timestamp not found in security header".into())
            })?;
            if timestamp.attr_local("Id").is_none() {
                timestamp.set_attr_ns("wsu", "Id", &built.fragment_ids.timestamp);
            }
        }

        // Reference set fixed by the transmission profile.
        let mut references: Vec<(String, bool)> =
            vec![(built.fragment_ids.timestamp.clone(), true)];
        if self.profile.signs_header_fragments() {
            for id in [
                built.fragment_ids.manifest_detail.as_ref(),
                built.fragment_ids.business_header.as_ref(),
            ] {
                let id = id.ok_or_else(|| {
                    TransmitError::Structure(
                        "extended profile requires manifest-detail and business-header ids".into(),
                    )
                })?;
                references.push((id.clone(), false));
            }
        }

        let mut reference_elements = Vec::with_capacity(references.len());
        for (id, enveloped) in &references {
            let target = self.resolve_id(&root, id).ok_or_else(|| {
                TransmitError::Structure(format!("signature reference target not found: #{id}"))
            })?;
            let scope = inherited_scope(&root, target)
                .ok_or_else(|| TransmitError::Structure(format!("detached reference target: #{id}")))?;
            let canonical = exclusive_c14n(target, &scope, *enveloped);
            let digest = BASE64.encode(sha2::Sha256::digest(canonical.as_bytes()));
            debug!(reference = %id, bytes = canonical.len(), "canonicalized signature reference");
            reference_elements.push(build_reference(id, *enveloped, &digest));
        }

        let token_id = format!("X509-{}", Uuid::new_v4().simple());
        let signature_id = format!("SIG-{}", Uuid::new_v4().simple());

        let mut signed_info = Element::new(Some("ds"), "SignedInfo")
            .with_child(
                Element::new(Some("ds"), "CanonicalizationMethod")
                    .with_attr("Algorithm", EXC_C14N_ALGORITHM),
            )
            .with_child(
                Element::new(Some("ds"), "SignatureMethod")
                    .with_attr("Algorithm", RSA_SHA256_ALGORITHM),
            );
        for reference in reference_elements {
            signed_info.push_child(reference);
        }

        // The ds prefix is declared on the enclosing Signature element;
        // canonicalization pulls it from that scope exactly the way a
        // verifier will.
        let ds_scope = vec![("ds".to_string(), DS_NS.to_string())];
        let signed_info_canonical = exclusive_c14n(&signed_info, &ds_scope, false);
        let signature_value = self.compute_signature(signed_info_canonical.as_bytes())?;

        let signature = Element::new(Some("ds"), "Signature")
            .with_namespace("ds", DS_NS)
            .with_attr("Id", &signature_id)
            .with_child(signed_info)
            .with_child(Element::new(Some("ds"), "SignatureValue").with_text(&signature_value))
            .with_child(
                Element::new(Some("ds"), "KeyInfo").with_child(
                    Element::new(Some("wsse"), "SecurityTokenReference")
                        .with_namespace("wsse", WSSE_NS)
                        .with_child(
                            Element::new(Some("wsse"), "Reference")
                                .with_attr("URI", &format!("#{token_id}"))
                                .with_attr("ValueType", X509V3_VALUE_TYPE),
                        ),
                ),
            );

        let token = Element::new(Some("wsse"), "BinarySecurityToken")
            .with_namespace("wsu", WSU_NS)
            .with_attr("EncodingType", BASE64_ENCODING_TYPE)
            .with_attr("ValueType", X509V3_VALUE_TYPE)
            .with_attr_ns("wsu", "Id", &token_id)
            .with_text(&BASE64.encode(self.identity.certificate_der()));

        // Token first, then the signature that references it.
        let security = root
            .find_descendant_mut("Security")
            .ok_or_else(|| TransmitError::Structure("wsse:Security header not found".into()))?;
        security.push_child(token);
        security.push_child(signature);

        debug!(references = references.len(), "envelope signed");
        Ok(root)
    }

    fn compute_signature(&self, canonical: &[u8]) -> Result<String, TransmitError> {
        let signing_key = SigningKey::<Sha256>::new(self.identity.private_key().clone());
        let signature = signing_key
            .try_sign(canonical)
            .map_err(|e| TransmitError::Credential(format!("RSA signing failed: {e}")))?;
        Ok(BASE64.encode(signature.to_bytes()))
    }
}

/// One `ds:Reference` with its transform chain and digest.
fn build_reference(id: &str, enveloped: bool, digest_base64: &str) -> Element {
    let mut transforms = Element::new(Some("ds"), "Transforms");
    if enveloped {
        transforms.push_child(
            Element::new(Some("ds"), "Transform")
                .with_attr("Algorithm", ENVELOPED_SIGNATURE_TRANSFORM),
        );
    }
    transforms.push_child(
        Element::new(Some("ds"), "Transform").with_attr("Algorithm", EXC_C14N_ALGORITHM),
    );

    Element::new(Some("ds"), "Reference")
        .with_attr("URI", &format!("#{id}"))
        .with_child(transforms)
        .with_child(
            Element::new(Some("ds"), "DigestMethod")
                .with_attr("Algorithm", SHA256_DIGEST_ALGORITHM),
        )
        .with_child(Element::new(Some("ds"), "DigestValue").with_text(digest_base64))
}
