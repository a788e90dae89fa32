//! Scenario manifest parsing.
//!
//! The manifest is a small XML document describing the filer: company
//! identity, mailing address, vendor contact, record counts, and software
//! identification. It is parsed with quick-xml (safe against XXE by
//! default, with an explicit DOCTYPE/entity pre-scan on top) into a
//! read-only view. Every field the envelope builder consumes must be
//! present and non-empty; absence is a hard error, never a default.

use crate::error::TransmitError;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Read-only structured view of the scenario manifest.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    payment_year: Option<String>,
    prior_year_data_ind: Option<String>,
    ein: Option<String>,
    company_name: Option<String>,
    address_line1: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip: Option<String>,
    contact_phone: Option<String>,
    vendor_contact_first_name: Option<String>,
    vendor_contact_last_name: Option<String>,
    vendor_contact_phone: Option<String>,
    total_payee_record_count: Option<String>,
    total_payer_record_count: Option<String>,
    software_id: Option<String>,
    form_type: Option<String>,
}

impl Manifest {
    /// Parse a manifest document.
    pub fn parse(xml: &str) -> Result<Self, TransmitError> {
        reject_doctype(xml)?;

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut manifest = Manifest::default();
        let mut path: Vec<String> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let local = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    path.push(local);
                }
                Ok(Event::End(_)) => {
                    path.pop();
                }
                Ok(Event::Text(ref t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| {
                            TransmitError::Template(format!("manifest text decode: {e}"))
                        })?
                        .to_string();
                    manifest.assign(&path, text);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(TransmitError::Template(format!(
                        "manifest parse error: {e}"
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(manifest)
    }

    /// Route a text node to its field by element path. The first path
    /// segment is the (arbitrary) document root.
    fn assign(&mut self, path: &[String], text: String) {
        if text.is_empty() {
            return;
        }
        let rel: Vec<&str> = path.iter().skip(1).map(String::as_str).collect();
        let slot = match rel.as_slice() {
            ["PaymentYr"] => &mut self.payment_year,
            ["PriorYearDataInd"] => &mut self.prior_year_data_ind,
            ["TransmitterInfo", "EIN"] => &mut self.ein,
            ["CompanyInformation", "CompanyName"] => &mut self.company_name,
            ["CompanyInformation", "MailingAddress", "AddressLine1"] => &mut self.address_line1,
            ["CompanyInformation", "MailingAddress", "City"] => &mut self.city,
            ["CompanyInformation", "MailingAddress", "State"] => &mut self.state,
            ["CompanyInformation", "MailingAddress", "Zip"] => &mut self.zip,
            ["CompanyInformation", "ContactPhone"] => &mut self.contact_phone,
            ["VendorInformation", "ContactFirstName"] => &mut self.vendor_contact_first_name,
            ["VendorInformation", "ContactLastName"] => &mut self.vendor_contact_last_name,
            ["VendorInformation", "ContactPhone"] => &mut self.vendor_contact_phone,
            ["TotalPayeeRecordCnt"] => &mut self.total_payee_record_count,
            ["TotalPayerRecordCnt"] => &mut self.total_payer_record_count,
            ["SoftwareId"] => &mut self.software_id,
            ["FormType"] => &mut self.form_type,
            _ => return,
        };
        *slot = Some(text);
    }

    fn required<'a>(
        field: &'a Option<String>,
        name: &str,
    ) -> Result<&'a str, TransmitError> {
        match field.as_deref() {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(TransmitError::Template(format!(
                "required manifest field missing: {name}"
            ))),
        }
    }

    pub fn payment_year(&self) -> Result<&str, TransmitError> {
        Self::required(&self.payment_year, "PaymentYr")
    }

    pub fn prior_year_data_ind(&self) -> Result<&str, TransmitError> {
        Self::required(&self.prior_year_data_ind, "PriorYearDataInd")
    }

    pub fn ein(&self) -> Result<&str, TransmitError> {
        Self::required(&self.ein, "TransmitterInfo/EIN")
    }

    pub fn company_name(&self) -> Result<&str, TransmitError> {
        Self::required(&self.company_name, "CompanyInformation/CompanyName")
    }

    pub fn address_line1(&self) -> Result<&str, TransmitError> {
        Self::required(
            &self.address_line1,
            "CompanyInformation/MailingAddress/AddressLine1",
        )
    }

    pub fn city(&self) -> Result<&str, TransmitError> {
        Self::required(&self.city, "CompanyInformation/MailingAddress/City")
    }

    pub fn state(&self) -> Result<&str, TransmitError> {
        Self::required(&self.state, "CompanyInformation/MailingAddress/State")
    }

    pub fn zip(&self) -> Result<&str, TransmitError> {
        Self::required(&self.zip, "CompanyInformation/MailingAddress/Zip")
    }

    pub fn contact_phone(&self) -> Result<&str, TransmitError> {
        Self::required(&self.contact_phone, "CompanyInformation/ContactPhone")
    }

    pub fn vendor_contact_first_name(&self) -> Result<&str, TransmitError> {
        Self::required(
            &self.vendor_contact_first_name,
            "VendorInformation/ContactFirstName",
        )
    }

    pub fn vendor_contact_last_name(&self) -> Result<&str, TransmitError> {
        Self::required(
            &self.vendor_contact_last_name,
            "VendorInformation/ContactLastName",
        )
    }

    pub fn vendor_contact_phone(&self) -> Result<&str, TransmitError> {
        Self::required(&self.vendor_contact_phone, "VendorInformation/ContactPhone")
    }

    pub fn total_payee_record_count(&self) -> Result<&str, TransmitError> {
        Self::required(&self.total_payee_record_count, "TotalPayeeRecordCnt")
    }

    pub fn total_payer_record_count(&self) -> Result<&str, TransmitError> {
        Self::required(&self.total_payer_record_count, "TotalPayerRecordCnt")
    }

    pub fn software_id(&self) -> Result<&str, TransmitError> {
        Self::required(&self.software_id, "SoftwareId")
    }

    pub fn form_type(&self) -> Result<&str, TransmitError> {
        Self::required(&self.form_type, "FormType")
    }
}

/// Reject DOCTYPE and entity declarations before handing the document to
/// the parser.
fn reject_doctype(xml: &str) -> Result<(), TransmitError> {
    if xml.contains("<!DOCTYPE") || xml.contains("<!doctype") || xml.contains("<!ENTITY") {
        return Err(TransmitError::Template(
            "manifest contains a DOCTYPE or entity declaration".into(),
        ));
    }
    Ok(())
}

/// Fully populated manifest fixture shared across the crate's tests.
#[cfg(test)]
pub(crate) const SAMPLE_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
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
