use crate::{
    core::{
        Approval, Approver, Authorizer, CertificateRequest, Decision, Identity, RequestState, Skip,
    },
    k8s::{self, Api, CertificateSigningRequest, Client, PatchParams, ResourceExt},
    metrics::ApprovalMetrics,
    IndexLookup,
};
use kube::runtime::controller::Action;
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{info, instrument, warn};


pub(crate) struct Context {
    client: Client,
    approver: Approver<Authorizer<IndexLookup>>,
    patch_timeout: Duration,
    retry_interval: Duration,
    metrics: ApprovalMetrics,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Authorize(anyhow::Error),

    #[error("failed to encode approval: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to approve {name}: {source}")]
    Patch {
        name: String,
        #[source]
        source: k8s::Error,
    },

    #[error("approving {name} timed out after {timeout:?}")]
    PatchTimeout { name: String, timeout: Duration },
}

// === impl Context ===

impl Context {
    pub(crate) fn new(
        client: Client,
        approver: Approver<Authorizer<IndexLookup>>,
        patch_timeout: Duration,
        retry_interval: Duration,
        metrics: ApprovalMetrics,
    ) -> Self {
        Self {
            client,
            approver,
            patch_timeout,
            retry_interval,
            metrics,
        }
    }

    async fn approve(
        &self,
        csr: &CertificateSigningRequest,
        approval: &Approval,
    ) -> Result<(), Error> {
        let name = csr.name_unchecked();
        let patch = k8s::csr::approval_patch(
            csr,
            approval.reason,
            &approval.message,
            approval.timestamp,
        )?;
        let api = Api::<CertificateSigningRequest>::all(self.client.clone());
        match time::timeout(
            self.patch_timeout,
            api.patch_approval(&name, &PatchParams::default(), &patch),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(source)) => Err(Error::Patch { name, source }),
            Err(_) => Err(Error::PatchTimeout {
                name,
                timeout: self.patch_timeout,
            }),
        }
    }
}

/// Evaluates a single certificate signing request, approving it if the requesting user is
/// authorized for every name in it.
#[instrument(skip_all, fields(name = %csr.name_any()))]
pub(crate) async fn reconcile(
    csr: Arc<CertificateSigningRequest>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let req = certificate_request(&csr);
    let decision = ctx.approver.decide(&req).await.map_err(Error::Authorize)?;

    match decision {
        Decision::NoOp(skip) => {
            ctx.metrics.record(skip.as_str());
            Ok(skipped(&skip, ctx.retry_interval))
        }
        Decision::Approve(approval) => {
            ctx.approve(&csr, &approval).await?;
            ctx.metrics.record("approved");
            info!(signer_name = %approval.signer_name, "Approved certificate signing request");
            Ok(Action::await_change())
        }
    }
}

pub(crate) fn error_policy(
    csr: Arc<CertificateSigningRequest>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    ctx.metrics.record("error");
    warn!(
        name = %csr.name_any(),
        %error,
        "Failed to evaluate certificate signing request; retrying"
    );
    Action::requeue(ctx.retry_interval)
}

/// Unauthorized requests are evaluated again later, since the configuration that names their
/// service may not have been indexed yet. Other skipped requests only change with the object.
fn skipped(skip: &Skip, retry_interval: Duration) -> Action {
    match skip {
        Skip::Unauthorized => Action::requeue(retry_interval),
        Skip::AlreadyDecided(_)
        | Skip::UnknownSigner(_)
        | Skip::Malformed(_)
        | Skip::Invalid(_) => Action::await_change(),
    }
}

/// Describes a Kubernetes certificate signing request in the approver's terms.
pub(crate) fn certificate_request(csr: &CertificateSigningRequest) -> CertificateRequest {
    let spec = &csr.spec;
    let state = if k8s::csr::is_approved(csr) {
        RequestState::Approved
    } else if k8s::csr::is_denied(csr) {
        RequestState::Denied
    } else {
        RequestState::Pending
    };

    CertificateRequest {
        signer_name: spec.signer_name.clone(),
        request: spec.request.0.clone(),
        usages: spec.usages.clone().unwrap_or_default(),
        identity: Identity {
            username: spec.username.clone().unwrap_or_default(),
            uid: spec.uid.clone().unwrap_or_default(),
            groups: spec.groups.clone().unwrap_or_default(),
            extra: spec.extra.clone().unwrap_or_default(),
        },
        state,
    }
}
