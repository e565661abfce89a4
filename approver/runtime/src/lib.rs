#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use webhook_approver_core as core;
pub use webhook_approver_k8s_api as k8s;
pub use webhook_approver_k8s_index as index;

mod approval;
mod args;
mod metrics;

pub use self::args::Args;

use anyhow::{bail, Result};
use std::collections::BTreeSet;

/// Answers configuration lookups from the shared index, failing while the index is still being
/// populated.
#[derive(Clone, Debug)]
pub struct IndexLookup(index::SharedIndex);

impl IndexLookup {
    pub fn new(index: index::SharedIndex) -> Self {
        Self(index)
    }
}

#[async_trait::async_trait]
impl core::LookupConfigurations for IndexLookup {
    async fn configurations_for_service(
        &self,
        service: &core::ServiceRef,
    ) -> Result<BTreeSet<core::ConfigurationRef>> {
        let index = self.0.read();
        if !index.is_synced() {
            bail!("webhook configuration index not yet synced");
        }
        Ok(index.configurations_for_service(service))
    }

    async fn configurations_for_principal(
        &self,
        identity: &core::Identity,
    ) -> Result<BTreeSet<core::ConfigurationRef>> {
        let index = self.0.read();
        if !index.is_synced() {
            bail!("webhook configuration index not yet synced");
        }
        Ok(index.configurations_for_principal(identity))
    }
}
