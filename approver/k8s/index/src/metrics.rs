use crate::SharedIndex;
use kube::Resource;
use kubert::index::{ClusterRemoved, IndexClusterResource};
use parking_lot::RwLock;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{counter::Counter, family::Family, gauge::ConstGauge, gauge::Gauge, MetricType},
    registry::Registry,
};
use std::sync::Arc;

/// Wraps an index to count the updates applied to it.
pub struct IndexMetrics<T> {
    inner: T,

    index_size: Family<IndexLabels, Gauge>,
    index_applies: Family<IndexLabels, Counter>,
    index_deletes: Family<IndexLabels, Counter>,
    index_resets: Family<IndexLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct IndexLabels {
    kind: String,
}

pub trait SizedIndex<R> {
    fn size(&self) -> usize;
}

#[derive(Debug)]
struct Instrumented(SharedIndex);

/// Registers gauges describing the contents of the index.
pub fn register(reg: &mut Registry, index: SharedIndex) {
    reg.register_collector(Box::new(Instrumented(index)));
}

impl<T, R> SizedIndex<R> for Arc<RwLock<T>>
where
    T: SizedIndex<R>,
{
    fn size(&self) -> usize {
        self.read().size()
    }
}

impl<T> IndexMetrics<T> {
    pub fn register(inner: T, prom: &mut Registry) -> Self {
        let index_size = Family::default();
        prom.register(
            "index_size",
            "Gauge of the number of resources in the index",
            index_size.clone(),
        );

        let index_applies = Family::default();
        prom.register(
            "index_applies",
            "Count of applies to the index",
            index_applies.clone(),
        );

        let index_deletes = Family::default();
        prom.register(
            "index_deletes",
            "Count of deletes to the index",
            index_deletes.clone(),
        );

        let index_resets = Family::default();
        prom.register(
            "index_resets",
            "Count of resets to the index",
            index_resets.clone(),
        );

        Self {
            inner,
            index_size,
            index_applies,
            index_deletes,
            index_resets,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }

    fn labels<R: Resource<DynamicType = ()>>() -> IndexLabels {
        IndexLabels {
            kind: R::kind(&()).to_string(),
        }
    }
}

impl<R, T> IndexClusterResource<R> for IndexMetrics<Arc<RwLock<T>>>
where
    T: SizedIndex<R>,
    T: IndexClusterResource<R>,
    R: Resource<DynamicType = ()>,
{
    fn apply(&mut self, resource: R) {
        let labels = Self::labels::<R>();
        self.index_applies.get_or_create(&labels).inc();
        self.inner.write().apply(resource);
        let size = SizedIndex::<R>::size(&self.inner);
        self.index_size.get_or_create(&labels).set(size as i64);
    }

    fn delete(&mut self, name: String) {
        let labels = Self::labels::<R>();
        self.index_deletes.get_or_create(&labels).inc();
        self.inner.write().delete(name);
        let size = SizedIndex::<R>::size(&self.inner);
        self.index_size.get_or_create(&labels).set(size as i64);
    }

    fn reset(&mut self, resources: Vec<R>, removed: ClusterRemoved) {
        let labels = Self::labels::<R>();
        self.index_resets.get_or_create(&labels).inc();
        self.inner.write().reset(resources, removed);
        let size = SizedIndex::<R>::size(&self.inner);
        self.index_size.get_or_create(&labels).set(size as i64);
    }
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let this = self.0.read();

        let services_encoder = encoder.encode_descriptor(
            "services",
            "The number of services named by webhook configurations",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(this.services_len() as u32).encode(services_encoder)?;

        let synced_encoder = encoder.encode_descriptor(
            "synced",
            "Whether every webhook configuration kind has been listed",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(u32::from(this.is_synced())).encode(synced_encoder)?;

        Ok(())
    }
}
