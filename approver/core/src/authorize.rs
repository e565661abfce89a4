use crate::{csr::ParsedRequest, ConfigurationRef, Identity, ServiceRef};
use anyhow::{anyhow, Error, Result};
use std::collections::BTreeSet;
use tracing::{debug, trace};


/// Decides whether a user may obtain a certificate for a single identifier.
///
/// An `Err` means the decision could not be made (e.g. because the state consulted by the
/// authorizer is unavailable) and must not be treated as a denial.
#[async_trait::async_trait]
pub trait Authorize {
    async fn is_authorized(&self, identity: &Identity, identifier: &str) -> Result<bool>;
}

/// Models lookups against the configurations that entitle users to serving certificates.
#[async_trait::async_trait]
pub trait LookupConfigurations {
    /// Returns the configurations that target the given service.
    async fn configurations_for_service(
        &self,
        service: &ServiceRef,
    ) -> Result<BTreeSet<ConfigurationRef>>;

    /// Returns the configurations that explicitly name the user or one of its groups.
    async fn configurations_for_principal(
        &self,
        identity: &Identity,
    ) -> Result<BTreeSet<ConfigurationRef>>;
}

/// Selects the authorization strategy used by an [`Authorizer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AuthorizerKind {
    /// Authorizes every identifier.
    AllowAll,

    /// Authorizes identifiers that name a service targeted by a webhook configuration.
    NamedPrincipal,

    /// Reserved for verifying that the user's own service account backs the target service.
    /// Currently authorizes every identifier.
    ServiceEndpoint,
}

#[derive(Clone, Debug)]
pub enum Authorizer<L> {
    AllowAll,
    NamedPrincipal(L),
    ServiceEndpoint,
}

/// Authorizes every identifier in the request, in order, stopping at the first identifier that is
/// not authorized or that fails to be checked.
///
/// A request without any identifiers is never authorized.
pub async fn authorize_request<A>(
    authorizer: &A,
    identity: &Identity,
    req: &ParsedRequest,
) -> Result<bool>
where
    A: Authorize + Sync + ?Sized,
{
    let identifiers = req.identifiers();
    if identifiers.is_empty() {
        debug!("Request does not specify any identifiers");
        return Ok(false);
    }

    for identifier in &identifiers {
        if !authorizer.is_authorized(identity, identifier).await? {
            debug!(username = %identity.username, %identifier, "Identifier not authorized");
            return Ok(false);
        }
        trace!(username = %identity.username, %identifier, "Identifier authorized");
    }

    Ok(true)
}

/// Parses a `<service>.<namespace>.<suffix>` hostname.
///
/// The suffix may itself contain dots (e.g. `svc.ns.cluster.local`), but the service and namespace
/// labels must not be empty.
pub fn parse_service_hostname(hostname: &str) -> Option<ServiceRef> {
    let mut labels = hostname.splitn(3, '.');
    let name = labels.next()?;
    let namespace = labels.next()?;
    let _suffix = labels.next()?;
    if name.is_empty() || namespace.is_empty() {
        return None;
    }
    Some(ServiceRef::new(namespace, name))
}

// === impl AuthorizerKind ===

impl std::str::FromStr for AuthorizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allow-all" => Ok(Self::AllowAll),
            "named-principal" => Ok(Self::NamedPrincipal),
            "service-endpoint" => Ok(Self::ServiceEndpoint),
            s => Err(anyhow!("invalid authorizer: {:?}", s)),
        }
    }
}

impl std::fmt::Display for AuthorizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllowAll => "allow-all".fmt(f),
            Self::NamedPrincipal => "named-principal".fmt(f),
            Self::ServiceEndpoint => "service-endpoint".fmt(f),
        }
    }
}

// === impl Authorizer ===

impl<L> Authorizer<L> {
    pub fn new(kind: AuthorizerKind, lookup: L) -> Self {
        match kind {
            AuthorizerKind::AllowAll => Self::AllowAll,
            AuthorizerKind::NamedPrincipal => Self::NamedPrincipal(lookup),
            AuthorizerKind::ServiceEndpoint => Self::ServiceEndpoint,
        }
    }

    pub fn kind(&self) -> AuthorizerKind {
        match self {
            Self::AllowAll => AuthorizerKind::AllowAll,
            Self::NamedPrincipal(_) => AuthorizerKind::NamedPrincipal,
            Self::ServiceEndpoint => AuthorizerKind::ServiceEndpoint,
        }
    }
}

#[async_trait::async_trait]
impl<L> Authorize for Authorizer<L>
where
    L: LookupConfigurations + Send + Sync,
{
    async fn is_authorized(&self, identity: &Identity, identifier: &str) -> Result<bool> {
        match self {
            Self::AllowAll | Self::ServiceEndpoint => Ok(true),
            Self::NamedPrincipal(lookup) => {
                let Some(service) = parse_service_hostname(identifier) else {
                    debug!(%identifier, "Identifier is not a service hostname");
                    return Ok(false);
                };

                let configs = lookup.configurations_for_service(&service).await?;
                if !configs.is_empty() {
                    trace!(%service, ?configs, "Service is targeted by webhook configurations");
                    return Ok(true);
                }

                let configs = lookup.configurations_for_principal(identity).await?;
                if !configs.is_empty() {
                    trace!(username = %identity.username, ?configs, "User is named by webhook configurations");
                    return Ok(true);
                }

                Ok(false)
            }
        }
    }
}
