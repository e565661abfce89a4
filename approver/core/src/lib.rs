#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Decides whether a certificate signing request addressed to the webhook-serving signer may be
//! approved.
//!
//! A request is decoded and checked against the signer's structural policy, then every name it
//! asks for is put to an [`Authorize`] implementation. The [`Approver`] combines both steps into a
//! single [`Decision`]; persisting that decision is left to the caller.

pub mod approval;
pub mod authorize;
pub mod csr;
mod identity;

#[cfg(test)]
mod test_util;

pub use self::{
    approval::{Approval, Approver, CertificateRequest, Decision, RequestState, Skip},
    authorize::{Authorize, Authorizer, AuthorizerKind, LookupConfigurations},
    identity::{ConfigurationKind, ConfigurationRef, Identity, ServiceRef},
};

/// The signer name that requests for webhook serving certificates are addressed to.
pub const WEBHOOK_SERVING_SIGNER_NAME: &str = "cert-manager.io/webhook-serving";
