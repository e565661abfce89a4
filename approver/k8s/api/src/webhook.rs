use crate::{MutatingWebhookConfiguration, ServiceReference, ValidatingWebhookConfiguration};
use kube::ResourceExt;

/// Grants certificates to a comma-separated list of usernames.
pub const AUTHORIZED_USERNAMES_ANNOTATION: &str = "webhooks.cert-manager.io/authorized-usernames";

/// Grants certificates to members of a comma-separated list of groups.
pub const AUTHORIZED_GROUPS_ANNOTATION: &str = "webhooks.cert-manager.io/authorized-groups";

/// Common accessors for admission webhook configurations.
pub trait WebhookConfiguration: ResourceExt {
    /// Returns the services that the configuration's webhooks call.
    ///
    /// Webhooks that are configured with a URL are skipped.
    fn services(&self) -> Vec<&ServiceReference>;

    fn authorized_usernames(&self) -> Vec<String> {
        annotation_list(self, AUTHORIZED_USERNAMES_ANNOTATION)
    }

    fn authorized_groups(&self) -> Vec<String> {
        annotation_list(self, AUTHORIZED_GROUPS_ANNOTATION)
    }
}

impl WebhookConfiguration for ValidatingWebhookConfiguration {
    fn services(&self) -> Vec<&ServiceReference> {
        self.webhooks
            .iter()
            .flatten()
            .filter_map(|wh| wh.client_config.service.as_ref())
            .collect()
    }
}

impl WebhookConfiguration for MutatingWebhookConfiguration {
    fn services(&self) -> Vec<&ServiceReference> {
        self.webhooks
            .iter()
            .flatten()
            .filter_map(|wh| wh.client_config.service.as_ref())
            .collect()
    }
}

fn annotation_list<T: ResourceExt + ?Sized>(resource: &T, key: &str) -> Vec<String> {
    resource
        .annotations()
        .get(key)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
