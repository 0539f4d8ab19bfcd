use std::marker::PhantomData;
use std::sync::Arc;

use rowbind_api::RowMapped;
use rowbind_api::row::Row;

use crate::binder;
use crate::cache::TypeMetadataCache;
use crate::config::MapperConfig;
use crate::conversion::ConversionService;
use crate::error::{BindError, ResolveError};
use crate::plan::ConstructionPlan;
use crate::resolver::{ConstructionPlanResolver, ResolveOptions};

/// Maps rows to `T` through a plan resolved once, when the mapper is created.
///
/// ```ignore
/// let mapper = RowMapper::<Order>::with_config(&MapperConfig::new(ColumnNaming::CamelCase))?;
/// let order = mapper.map_row(&row)?;
/// ```
pub struct RowMapper<T> {
    plan: Arc<ConstructionPlan>,
    _target: PhantomData<fn() -> T>,
}

impl<T: RowMapped> RowMapper<T> {
    /// Default configuration, global cache.
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_config(&MapperConfig::default())
    }

    pub fn with_config(config: &MapperConfig) -> Result<Self, ResolveError> {
        Self::in_cache(TypeMetadataCache::global(), ResolveOptions::from(config))
    }

    /// Build through the factory called `factory` instead of the default selection.
    pub fn using_factory(config: &MapperConfig, factory: &'static str) -> Result<Self, ResolveError> {
        Self::in_cache(
            TypeMetadataCache::global(),
            ResolveOptions::from(config).with_factory(factory),
        )
    }

    /// Fall back to `conversions` for parameter types with no built-in
    /// coercion and no declared deserializer.
    pub fn with_conversions(
        config: &MapperConfig,
        conversions: Arc<ConversionService>,
    ) -> Result<Self, ResolveError> {
        Self::in_cache(
            TypeMetadataCache::global(),
            ResolveOptions::from(config).with_conversions(conversions),
        )
    }

    pub fn in_cache(cache: &TypeMetadataCache, options: ResolveOptions) -> Result<Self, ResolveError> {
        let plan = ConstructionPlanResolver::new(cache, options).resolve::<T>()?;
        tracing::debug!(
            target_type = plan.target.name(),
            factory = plan.factory,
            "row mapper ready"
        );
        Ok(Self {
            plan,
            _target: PhantomData,
        })
    }

    pub fn map_row(&self, row: &Row<'_>) -> Result<T, BindError> {
        let value = binder::bind(&self.plan, row)?;
        value
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| BindError::Construction {
                type_name: self.plan.target.name(),
                source: format!(
                    "factory '{}' did not produce a {}",
                    self.plan.factory,
                    std::any::type_name::<T>()
                )
                .into(),
            })
    }

    /// Map every row independently; a failing row does not stop the others.
    pub fn map_rows<'r, 'd: 'r, I>(&self, rows: I) -> impl Iterator<Item = Result<T, BindError>>
    where
        I: IntoIterator<Item = &'r Row<'d>>,
    {
        rows.into_iter().map(move |row| self.map_row(row))
    }

    pub fn plan(&self) -> &Arc<ConstructionPlan> {
        &self.plan
    }
}

impl<T> Clone for RowMapper<T> {
    fn clone(&self) -> Self {
        Self {
            plan: Arc::clone(&self.plan),
            _target: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for RowMapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowMapper")
            .field("target", &self.plan.target)
            .field("factory", &self.plan.factory)
            .finish()
    }
}
