use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use kubert::index::{ClusterRemoved, IndexClusterResource};
use parking_lot::RwLock;
use std::{collections::BTreeSet, hash::Hash, sync::Arc};
use tracing::{debug, info, trace};
use webhook_approver_core::{ConfigurationKind, ConfigurationRef, Identity, ServiceRef};
use webhook_approver_k8s_api::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration, WebhookConfiguration,
};

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds the services and principals named by each webhook configuration, along with reverse maps
/// for lookups.
#[derive(Debug, Default)]
pub struct Index {
    configurations: HashMap<ConfigurationRef, Configuration>,

    by_service: HashMap<ServiceRef, BTreeSet<ConfigurationRef>>,
    by_username: HashMap<String, BTreeSet<ConfigurationRef>>,
    by_group: HashMap<String, BTreeSet<ConfigurationRef>>,

    /// Kinds whose initial listing has been applied.
    synced: HashSet<ConfigurationKind>,
}

/// The entitlements granted by a single webhook configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    pub services: BTreeSet<ServiceRef>,
    pub usernames: BTreeSet<String>,
    pub groups: BTreeSet<String>,
}

/// A Kubernetes resource that is indexed as a webhook configuration.
pub trait ConfigurationResource: WebhookConfiguration {
    const KIND: ConfigurationKind;
}

impl ConfigurationResource for ValidatingWebhookConfiguration {
    const KIND: ConfigurationKind = ConfigurationKind::ValidatingWebhook;
}

impl ConfigurationResource for MutatingWebhookConfiguration {
    const KIND: ConfigurationKind = ConfigurationKind::MutatingWebhook;
}

// === impl Configuration ===

impl Configuration {
    pub fn from_resource<T: WebhookConfiguration>(resource: &T) -> Self {
        Self {
            services: resource
                .services()
                .into_iter()
                .map(|svc| ServiceRef::new(&svc.namespace, &svc.name))
                .collect(),
            usernames: resource.authorized_usernames().into_iter().collect(),
            groups: resource.authorized_groups().into_iter().collect(),
        }
    }
}

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Records the entitlements of a configuration, replacing any previously recorded for it.
    pub fn apply_configuration(&mut self, id: ConfigurationRef, config: Configuration) {
        if self.configurations.get(&id) == Some(&config) {
            trace!(%id, "Configuration unchanged");
            return;
        }

        self.unlink(&id);
        for svc in &config.services {
            link(&mut self.by_service, svc, &id);
        }
        for username in &config.usernames {
            link(&mut self.by_username, username, &id);
        }
        for group in &config.groups {
            link(&mut self.by_group, group, &id);
        }
        debug!(
            %id,
            services = config.services.len(),
            usernames = config.usernames.len(),
            groups = config.groups.len(),
            "Indexed configuration"
        );
        self.configurations.insert(id, config);
    }

    /// Forgets a configuration. Returns false if it was not indexed.
    pub fn remove_configuration(&mut self, id: &ConfigurationRef) -> bool {
        if self.unlink(id).is_none() {
            return false;
        }
        debug!(%id, "Removed configuration");
        true
    }

    /// Returns the configurations that call the given service.
    pub fn configurations_for_service(&self, service: &ServiceRef) -> BTreeSet<ConfigurationRef> {
        self.by_service.get(service).cloned().unwrap_or_default()
    }

    /// Returns the configurations that name the user, or any of the user's groups, in their
    /// allow-lists.
    pub fn configurations_for_principal(&self, identity: &Identity) -> BTreeSet<ConfigurationRef> {
        let mut configs = self
            .by_username
            .get(&identity.username)
            .cloned()
            .unwrap_or_default();
        for group in &identity.groups {
            if let Some(refs) = self.by_group.get(group) {
                configs.extend(refs.iter().cloned());
            }
        }
        configs
    }

    /// Indicates whether the initial listing of every configuration kind has been applied.
    ///
    /// Until then, an empty lookup may only mean that the index has not been populated yet.
    pub fn is_synced(&self) -> bool {
        [
            ConfigurationKind::ValidatingWebhook,
            ConfigurationKind::MutatingWebhook,
        ]
        .iter()
        .all(|kind| self.synced.contains(kind))
    }

    /// The number of indexed configurations of the given kind.
    pub fn len(&self, kind: ConfigurationKind) -> usize {
        self.configurations.keys().filter(|id| id.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// The number of distinct services named by any configuration.
    pub fn services_len(&self) -> usize {
        self.by_service.len()
    }

    fn unlink(&mut self, id: &ConfigurationRef) -> Option<Configuration> {
        let config = self.configurations.remove(id)?;
        for svc in &config.services {
            unlink(&mut self.by_service, svc, id);
        }
        for username in &config.usernames {
            unlink(&mut self.by_username, username, id);
        }
        for group in &config.groups {
            unlink(&mut self.by_group, group, id);
        }
        Some(config)
    }
}

fn link<K>(map: &mut HashMap<K, BTreeSet<ConfigurationRef>>, key: &K, id: &ConfigurationRef)
where
    K: Clone + Eq + Hash,
{
    map.entry(key.clone()).or_default().insert(id.clone());
}

fn unlink<K>(map: &mut HashMap<K, BTreeSet<ConfigurationRef>>, key: &K, id: &ConfigurationRef)
where
    K: Eq + Hash,
{
    if let Some(refs) = map.get_mut(key) {
        refs.remove(id);
        if refs.is_empty() {
            map.remove(key);
        }
    }
}

impl<T> IndexClusterResource<T> for Index
where
    T: ConfigurationResource,
{
    fn apply(&mut self, resource: T) {
        let id = ConfigurationRef {
            kind: T::KIND,
            name: resource.name_unchecked(),
        };
        let config = Configuration::from_resource(&resource);
        self.apply_configuration(id, config);
    }

    fn delete(&mut self, name: String) {
        self.remove_configuration(&ConfigurationRef {
            kind: T::KIND,
            name,
        });
    }

    fn reset(&mut self, resources: Vec<T>, removed: ClusterRemoved) {
        for resource in resources {
            self.apply(resource);
        }
        for name in removed {
            <Self as IndexClusterResource<T>>::delete(self, name);
        }

        if self.synced.insert(T::KIND) {
            info!(kind = %T::KIND, configurations = self.len(T::KIND), "Index synced");
        }
    }
}

impl<T> crate::metrics::SizedIndex<T> for Index
where
    T: ConfigurationResource,
{
    fn size(&self) -> usize {
        self.len(T::KIND)
    }
}
