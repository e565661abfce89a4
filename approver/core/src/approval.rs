use crate::{
    authorize::{authorize_request, Authorize},
    csr::{self, ParseError, Rejection},
    Identity,
};
use anyhow::Result;
use chrono::{offset::Utc, DateTime};
use tracing::{debug, info};

#[cfg(test)]
mod tests;

pub const APPROVAL_REASON: &str = "AutoApproved";

/// The decision recorded on a certificate signing request.
///
/// `Approved` and `Denied` are terminal.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RequestState {
    #[default]
    Pending,
    Approved,
    Denied,
}

/// A certificate signing request as observed by the approver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertificateRequest {
    pub signer_name: String,

    /// The PEM-encoded PKCS#10 request.
    pub request: Vec<u8>,

    pub usages: Vec<String>,
    pub identity: Identity,
    pub state: RequestState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Approval {
    pub signer_name: String,
    pub reason: &'static str,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    /// The request must be left as it is.
    NoOp(Skip),

    /// The request must be marked approved.
    Approve(Approval),
}

/// Describes why a request is left unchanged.
#[derive(Debug, PartialEq, Eq)]
pub enum Skip {
    AlreadyDecided(RequestState),
    UnknownSigner(String),
    Malformed(ParseError),
    Invalid(Rejection),
    Unauthorized,
}

/// Approves requests for the configured signer when the requesting user is authorized for every
/// name in the request.
#[derive(Clone, Debug)]
pub struct Approver<A> {
    signer_name: String,
    authorizer: A,
}

// === impl RequestState ===

impl RequestState {
    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

// === impl Decision ===

impl Decision {
    pub fn is_approve(&self) -> bool {
        matches!(self, Self::Approve(_))
    }
}

// === impl Skip ===

impl Skip {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyDecided(_) => "already_decided",
            Self::UnknownSigner(_) => "foreign_signer",
            Self::Malformed(_) => "malformed",
            Self::Invalid(_) => "invalid",
            Self::Unauthorized => "unauthorized",
        }
    }
}

// === impl Approver ===

impl<A> Approver<A> {
    pub fn new(signer_name: impl Into<String>, authorizer: A) -> Self {
        Self {
            signer_name: signer_name.into(),
            authorizer,
        }
    }

    pub fn authorizer(&self) -> &A {
        &self.authorizer
    }
}

impl<A> Approver<A>
where
    A: Authorize + Sync,
{
    /// Decides whether the request should be approved.
    ///
    /// Requests that are malformed, violate the signer's policy, or are not authorized are left
    /// pending rather than denied. An error indicates that authorization could not be determined
    /// and that the request should be evaluated again later.
    pub async fn decide(&self, req: &CertificateRequest) -> Result<Decision> {
        if req.state.is_decided() {
            return Ok(Decision::NoOp(Skip::AlreadyDecided(req.state)));
        }

        if req.signer_name != self.signer_name {
            debug!(signer_name = %req.signer_name, "Unrecognised signer name, ignoring");
            return Ok(Decision::NoOp(Skip::UnknownSigner(req.signer_name.clone())));
        }

        let parsed = match csr::decode(&req.request) {
            Ok(parsed) => parsed,
            Err(error) => {
                info!(%error, "Failed to parse certificate request");
                return Ok(Decision::NoOp(Skip::Malformed(error)));
            }
        };

        if let Err(rejection) = csr::check(req.usages.as_slice(), &parsed) {
            match &rejection {
                Rejection::SubjectAltNames {
                    ip_addresses,
                    email_addresses,
                    uris,
                } => info!(?ip_addresses, ?email_addresses, ?uris, "{rejection}"),
                Rejection::Usages(usages) => info!(?usages, "{rejection}"),
            }
            return Ok(Decision::NoOp(Skip::Invalid(rejection)));
        }

        if !authorize_request(&self.authorizer, &req.identity, &parsed).await? {
            info!(username = %req.identity.username, "User not authorized to request certificates for names");
            return Ok(Decision::NoOp(Skip::Unauthorized));
        }

        Ok(Decision::Approve(Approval {
            signer_name: self.signer_name.clone(),
            reason: APPROVAL_REASON,
            message: format!("Automatically approved by {}", self.signer_name),
            timestamp: Utc::now(),
        }))
    }
}
