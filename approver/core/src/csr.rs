//! Decodes PEM-encoded PKCS#10 requests and applies the webhook-serving signer's policy to them.

use std::{
    collections::BTreeSet,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};
use thiserror::Error;
use x509_parser::{
    certification_request::X509CertificationRequest,
    cri_attributes::ParsedCriAttribute,
    extensions::{GeneralName, ParsedExtension},
    oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME,
    pem::parse_x509_pem,
    prelude::FromDer,
};


pub const PEM_TYPE: &str = "CERTIFICATE REQUEST";

pub const USAGE_DIGITAL_SIGNATURE: &str = "digital signature";
pub const USAGE_KEY_ENCIPHERMENT: &str = "key encipherment";
pub const USAGE_SERVER_AUTH: &str = "server auth";
pub const USAGE_CLIENT_AUTH: &str = "client auth";

/// The exact set of usages a webhook serving certificate may be requested with.
pub const WEBHOOK_SERVING_USAGES: [&str; 3] = [
    USAGE_DIGITAL_SIGNATURE,
    USAGE_KEY_ENCIPHERMENT,
    USAGE_SERVER_AUTH,
];

/// The names and addresses a certificate request asks to be bound to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedRequest {
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub email_addresses: Vec<String>,
    pub uris: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("failed to decode PEM data: {0}")]
    Pem(String),

    #[error("expected PEM data of type 'CERTIFICATE REQUEST' but found {0:?}")]
    UnexpectedType(String),

    #[error("expected a single PEM block")]
    TrailingData,

    #[error("failed to parse certificate request: {0}")]
    Request(String),

    #[error("cannot parse IP address of length {0}")]
    IpAddress(usize),
}

/// Describes why a well-formed request is not acceptable to the webhook-serving signer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("request specifies IP addresses, email addresses or URIs")]
    SubjectAltNames {
        ip_addresses: Vec<IpAddr>,
        email_addresses: Vec<String>,
        uris: Vec<String>,
    },

    #[error("request specifies invalid key usages: {0:?}")]
    Usages(Vec<String>),
}

/// Decodes a single PEM block holding a certificate request.
pub fn decode(raw: &[u8]) -> Result<ParsedRequest, ParseError> {
    let (rest, pem) = parse_x509_pem(raw).map_err(|e| ParseError::Pem(e.to_string()))?;
    if pem.label != PEM_TYPE {
        return Err(ParseError::UnexpectedType(pem.label));
    }
    if !rest.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::TrailingData);
    }

    let (_, csr) = X509CertificationRequest::from_der(&pem.contents)
        .map_err(|e| ParseError::Request(e.to_string()))?;

    // When the subject carries several common names, the last one wins.
    let common_name = match csr.certification_request_info.subject.iter_common_name().last() {
        Some(cn) => cn
            .as_str()
            .map_err(|e| ParseError::Request(e.to_string()))?
            .to_string(),
        None => String::new(),
    };

    let mut parsed = ParsedRequest {
        common_name,
        ..Default::default()
    };
    let requested = csr
        .certification_request_info
        .iter_attributes()
        .filter_map(|attr| match attr.parsed_attribute() {
            ParsedCriAttribute::ExtensionRequest(req) => Some(req.extensions.iter()),
            _ => None,
        })
        .flatten();
    for ext in requested {
        if ext.oid != OID_X509_EXT_SUBJECT_ALT_NAME {
            continue;
        }
        // An unparseable SAN extension could hide names the signer must reject.
        let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() else {
            return Err(ParseError::Request(
                "invalid subject alternative name extension".to_string(),
            ));
        };
        for name in &san.general_names {
            match name {
                GeneralName::DNSName(dns) => parsed.dns_names.push(dns.to_string()),
                GeneralName::RFC822Name(email) => parsed.email_addresses.push(email.to_string()),
                GeneralName::URI(uri) => parsed.uris.push(uri.to_string()),
                GeneralName::IPAddress(bytes) => parsed.ip_addresses.push(ip_address(bytes)?),
                _ => {}
            }
        }
    }

    Ok(parsed)
}

fn ip_address(bytes: &[u8]) -> Result<IpAddr, ParseError> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Ok(Ipv4Addr::from(octets).into());
    }
    if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        return Ok(Ipv6Addr::from(octets).into());
    }
    Err(ParseError::IpAddress(bytes.len()))
}

/// Returns true if the request is acceptable to the webhook-serving signer.
pub fn validate<S: AsRef<str>>(usages: &[S], req: &ParsedRequest) -> bool {
    check(usages, req).is_ok()
}

/// Like [`validate`], but describes the first policy violation found.
pub fn check<S: AsRef<str>>(usages: &[S], req: &ParsedRequest) -> Result<(), Rejection> {
    if !req.ip_addresses.is_empty() || !req.email_addresses.is_empty() || !req.uris.is_empty() {
        return Err(Rejection::SubjectAltNames {
            ip_addresses: req.ip_addresses.clone(),
            email_addresses: req.email_addresses.clone(),
            uris: req.uris.clone(),
        });
    }

    let requested = usages.iter().map(|u| u.as_ref()).collect::<BTreeSet<&str>>();
    let allowed = WEBHOOK_SERVING_USAGES.into_iter().collect::<BTreeSet<_>>();
    if requested != allowed {
        return Err(Rejection::Usages(
            usages.iter().map(|u| u.as_ref().to_string()).collect(),
        ));
    }

    Ok(())
}

// === impl ParsedRequest ===

impl ParsedRequest {
    /// The de-duplicated names the request asks for, in lexicographic order.
    pub fn identifiers(&self) -> Vec<String> {
        let mut names = self
            .dns_names
            .iter()
            .map(String::as_str)
            .collect::<BTreeSet<_>>();
        if !self.common_name.is_empty() {
            names.insert(&self.common_name);
        }
        names.into_iter().map(str::to_string).collect()
    }
}
