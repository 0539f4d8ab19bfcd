use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rowbind_api::metadata::TypeKey;
use rowbind_api::naming::{ColumnNaming, NameJoiner};

use crate::error::ResolveError;
use crate::plan::ConstructionPlan;

/// Identifies one resolved plan: the same type resolved with other naming
/// options, another factory or another conversion service is a different plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub target: TypeKey,
    pub naming: ColumnNaming,
    pub joiner: NameJoiner,
    pub factory: Option<&'static str>,
    /// `ConversionService::id` of the mapper's converters.
    pub conversions: Option<u64>,
}

type PlanResult = Result<Arc<ConstructionPlan>, ResolveError>;
type Slot = Arc<OnceLock<PlanResult>>;

/// Process-wide plan cache.
///
/// Each key owns a `OnceLock` slot: the first requester builds, concurrent
/// requesters of the same key block on the slot and share the result.
/// The map lock is only held to look up or insert a slot, never while a
/// plan is being built. Failed builds are cached like successful ones.
#[derive(Debug, Default)]
pub struct TypeMetadataCache {
    plans: RwLock<HashMap<PlanKey, Slot>>,
    builds: AtomicU64,
}

impl TypeMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared instance used by `RowMapper::new` and friends.
    pub fn global() -> &'static TypeMetadataCache {
        static GLOBAL: OnceLock<TypeMetadataCache> = OnceLock::new();
        GLOBAL.get_or_init(TypeMetadataCache::new)
    }

    pub fn get_or_build<F>(&self, key: PlanKey, build: F) -> PlanResult
    where
        F: FnOnce() -> Result<ConstructionPlan, ResolveError>,
    {
        let slot = self.slot(key);
        slot.get_or_init(|| {
            self.builds.fetch_add(1, Ordering::Relaxed);
            build().map(Arc::new)
        })
        .clone()
    }

    /// Already resolved plan for `key`, if any.
    pub fn get(&self, key: &PlanKey) -> Option<PlanResult> {
        self.read().get(key).and_then(|slot| slot.get().cloned())
    }

    /// Number of plan builds performed so far (successful or not).
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn slot(&self, key: PlanKey) -> Slot {
        if let Some(slot) = self.read().get(&key) {
            return Arc::clone(slot);
        }
        Arc::clone(self.write().entry(key).or_default())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PlanKey, Slot>> {
        match self.plans.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("plan cache read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PlanKey, Slot>> {
        match self.plans.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("plan cache write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
