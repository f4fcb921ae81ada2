//! Layer catalog: discovery, admission policy, and the served registry.
//!
//! The registry is rebuilt as a whole on build and refresh and published
//! through an atomic `Arc` swap, so readers always hold one internally
//! consistent generation. Between refreshes it is immutable except for
//! per-layer bounds, which are probed lazily and memoized once per
//! generation.

mod discovery;
mod filter;

pub use filter::FilterPolicy;

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use metrics::gauge;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::lock::{rw_read, rw_write};
use crate::domain::{Bounds, Layer};
use crate::infra::db::{Connection, ConnectionError};

const SOURCE: &str = "catalog";

pub const METRIC_LAYERS: &str = "strato_catalog_layers";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("layer discovery failed")]
    Discovery(#[from] ConnectionError),
    #[error("no such layer: {name}")]
    NotFound { name: String },
}

impl CatalogError {
    pub fn not_found(name: impl Into<String>) -> Self {
        CatalogError::NotFound { name: name.into() }
    }
}

/// Closed read contract the HTTP layer depends on.
pub trait LayerCatalog: Send + Sync {
    /// Every servable layer, ordered by name. Side-effect free.
    fn layers(&self) -> Vec<Layer>;

    /// One layer with its bounds resolved; the extent is computed on
    /// first access and memoized for the life of the registry generation.
    fn layer(&self, name: &str) -> Result<Layer, CatalogError>;
}

struct RegistryEntry {
    layer: Layer,
    bounds: OnceLock<Option<Bounds>>,
}

impl RegistryEntry {
    fn new(layer: Layer) -> Self {
        Self {
            layer,
            bounds: OnceLock::new(),
        }
    }

    fn materialize(&self) -> Layer {
        let mut layer = self.layer.clone();
        if let Some(bounds) = self.bounds.get() {
            layer.bounds = *bounds;
        }
        layer
    }
}

type LayerRegistry = BTreeMap<String, Arc<RegistryEntry>>;

/// Production catalog over a live connection.
pub struct Catalog {
    conn: Arc<dyn Connection>,
    policy: FilterPolicy,
    registry: RwLock<Arc<LayerRegistry>>,
}

impl Catalog {
    /// Introspects the database and builds the initial registry. Fails
    /// only when the listing query itself fails; a layer whose probes
    /// fail is skipped with a warning and the rest still load.
    pub fn build(conn: Arc<dyn Connection>, policy: FilterPolicy) -> Result<Self, CatalogError> {
        let registry = build_registry(conn.as_ref(), &policy)?;
        publish_size(registry.len());
        info!(layers = registry.len(), "catalog built");
        Ok(Self {
            conn,
            policy,
            registry: RwLock::new(Arc::new(registry)),
        })
    }

    /// Re-runs discovery and atomically publishes the new registry.
    /// Readers caught mid-request keep their prior consistent view.
    /// Returns the layer count of the new generation.
    pub fn refresh(&self) -> Result<usize, CatalogError> {
        let registry = build_registry(self.conn.as_ref(), &self.policy)?;
        let count = registry.len();
        *rw_write(&self.registry, SOURCE, "refresh") = Arc::new(registry);
        publish_size(count);
        info!(layers = count, "catalog refreshed");
        Ok(count)
    }

    fn snapshot(&self) -> Arc<LayerRegistry> {
        rw_read(&self.registry, SOURCE, "snapshot").clone()
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl LayerCatalog for Catalog {
    fn layers(&self) -> Vec<Layer> {
        self.snapshot()
            .values()
            .map(|entry| entry.materialize())
            .collect()
    }

    fn layer(&self, name: &str) -> Result<Layer, CatalogError> {
        let snapshot = self.snapshot();
        let entry = snapshot
            .get(name)
            .ok_or_else(|| CatalogError::not_found(name))?;
        entry
            .bounds
            .get_or_init(|| discovery::layer_bounds(self.conn.as_ref(), &entry.layer));
        Ok(entry.materialize())
    }
}

fn build_registry(
    conn: &dyn Connection,
    policy: &FilterPolicy,
) -> Result<LayerRegistry, CatalogError> {
    let mut registry = LayerRegistry::new();
    // discover() yields tables before functions, so on a name collision
    // the table is already seated and the function is dropped.
    for layer in discovery::discover(conn, policy)? {
        match registry.entry(layer.name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(RegistryEntry::new(layer)));
            }
            Entry::Occupied(existing) => {
                warn!(
                    layer = %layer.name,
                    kept = existing.get().layer.kind.as_str(),
                    dropped = layer.kind.as_str(),
                    "layer name collision"
                );
            }
        }
    }
    Ok(registry)
}

fn publish_size(count: usize) {
    gauge!(METRIC_LAYERS).set(count as f64);
}
