use crate::{
    approval::{self, Context},
    core::{Approver, Authorizer, AuthorizerKind, WEBHOOK_SERVING_SIGNER_NAME},
    index::{self, metrics::IndexMetrics, Index},
    k8s::{self, Api},
    metrics::ApprovalMetrics,
    IndexLookup,
};
use anyhow::{bail, Result};
use clap::Parser;
use futures::prelude::*;
use kube::runtime::{watcher, Controller};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "webhook-approver",
    about = "Approves serving certificates for admission webhooks"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "webhook_approver=info,warn",
        env = "WEBHOOK_APPROVER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The signer name of the certificate signing requests to approve.
    #[clap(long, default_value = WEBHOOK_SERVING_SIGNER_NAME)]
    signer_name: String,

    /// Determines which names a user may request certificates for.
    #[clap(long, default_value = "named-principal")]
    authorizer: AuthorizerKind,

    /// Delay before a request is evaluated again after authorization could not be determined.
    #[clap(long, default_value = "10")]
    retry_interval_secs: u64,

    #[clap(long, default_value = "5000")]
    patch_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            signer_name,
            authorizer,
            retry_interval_secs,
            patch_timeout_ms,
        } = self;

        let index = Index::shared();

        let mut prom = <Registry>::default();
        let index_reg = prom.sub_registry_with_prefix("webhook_configuration");
        index::metrics::register(index_reg, index.clone());
        let index_metrics = IndexMetrics::register(index.clone(), index_reg).shared();
        let approval_metrics = ApprovalMetrics::register(prom.sub_registry_with_prefix("approval"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // Spawn resource watches.

        let validating = runtime
            .watch_all::<k8s::ValidatingWebhookConfiguration>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(index_metrics.clone(), validating)
                .instrument(info_span!("validatingwebhookconfigurations")),
        );

        let mutating =
            runtime.watch_all::<k8s::MutatingWebhookConfiguration>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(index_metrics, mutating)
                .instrument(info_span!("mutatingwebhookconfigurations")),
        );

        // Spawn the approval controller. Only requests addressed to our signer are watched.
        let approver = Approver::new(
            signer_name.clone(),
            Authorizer::new(authorizer, IndexLookup::new(index)),
        );
        let ctx = Arc::new(Context::new(
            runtime.client(),
            approver,
            Duration::from_millis(patch_timeout_ms),
            Duration::from_secs(retry_interval_secs),
            approval_metrics,
        ));
        let csrs = Api::<k8s::CertificateSigningRequest>::all(runtime.client());
        let controller = Controller::new(
            csrs,
            watcher::Config::default().fields(&format!("spec.signerName={signer_name}")),
        )
        .run(approval::reconcile, approval::error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => debug!(name = %obj.name, ?action, "Reconciled"),
                Err(error) => warn!(%error, "Reconcile failed"),
            }
        });

        let shutdown = runtime.shutdown_handle();
        tokio::spawn(
            async move {
                info!(%signer_name, %authorizer, "Approving certificate signing requests");
                tokio::select! {
                    _ = controller => {}
                    handle = shutdown.signaled() => {
                        debug!("Shutting down approval controller");
                        drop(handle);
                    }
                }
            }
            .instrument(info_span!("approvals")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
