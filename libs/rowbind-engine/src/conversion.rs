use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rowbind_api::error::CoercionError;
use rowbind_api::metadata::{AnyValue, ColumnDeserializer, DeserializeFn, TypeKey};
use rowbind_api::value::Value;

use crate::coercion::Coercion;
use crate::error::ResolveError;

/// A mapper-level conversion from a raw column value to `target`.
#[derive(Debug, Clone)]
pub struct Converter {
    pub name: &'static str,
    /// Raw value → converter argument.
    pub source: Coercion,
    pub target: TypeKey,
    invoke: DeserializeFn,
}

impl Converter {
    pub fn convert(&self, value: &Value<'_>) -> Result<AnyValue, CoercionError> {
        let source = self.source.apply(value)?;
        self.invoke
            .call(source)
            .map_err(|e| e.with_context(self.name))
    }
}

/// Converters keyed by the type they produce.
///
/// Consulted for column parameters whose type has no built-in coercion and
/// no deserializer declared on the target type. Nested and flattened types
/// resolved under the same mapper see the same service.
///
/// ```ignore
/// let mut conversions = ConversionService::new();
/// conversions.register("YearMonth::from_yyyymm", |n: u32| YearMonth::try_from(n))?;
/// let mapper = RowMapper::<Dst>::with_conversions(&MapperConfig::default(), Arc::new(conversions))?;
/// ```
#[derive(Clone)]
pub struct ConversionService {
    id: u64,
    by_target: HashMap<TypeKey, Arc<Converter>>,
}

fn next_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

impl ConversionService {
    pub fn new() -> Self {
        Self {
            id: next_id(),
            by_target: HashMap::new(),
        }
    }

    /// Identity of this set of converters in plan cache keys. Changes
    /// whenever a converter is registered.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Register a conversion `S → T`. A later registration for the same
    /// target replaces the earlier one.
    pub fn register<S, T, E, F>(&mut self, name: &'static str, f: F) -> Result<(), ResolveError>
    where
        S: Send + 'static,
        T: Send + 'static,
        E: fmt::Display,
        F: Fn(S) -> Result<T, E> + Send + Sync + 'static,
    {
        let invoke = DeserializeFn::new(move |s: S| {
            f(s).map_err(|e| CoercionError::deserializer(e.to_string()))
        });
        self.insert(name, TypeKey::of::<S>(), TypeKey::of::<T>(), invoke)
    }

    pub fn register_deserializer<D: ColumnDeserializer>(
        &mut self,
        name: &'static str,
        deserializer: D,
    ) -> Result<(), ResolveError> {
        let invoke = DeserializeFn::new(move |s: D::Source| deserializer.deserialize(s));
        self.insert(
            name,
            TypeKey::of::<D::Source>(),
            TypeKey::of::<D::Target>(),
            invoke,
        )
    }

    pub fn get(&self, target: &TypeKey) -> Option<&Arc<Converter>> {
        self.by_target.get(target)
    }

    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    fn insert(
        &mut self,
        name: &'static str,
        source: TypeKey,
        target: TypeKey,
        invoke: DeserializeFn,
    ) -> Result<(), ResolveError> {
        let source_coercion =
            Coercion::for_type(&source).ok_or_else(|| ResolveError::UnsupportedType {
                type_name: target.name(),
                parameter: format!("argument of converter {name}"),
                declared: source.name(),
            })?;
        let replaced = self.by_target.insert(
            target,
            Arc::new(Converter {
                name,
                source: source_coercion,
                target,
                invoke,
            }),
        );
        if let Some(previous) = replaced {
            tracing::debug!(
                target_type = target.name(),
                previous = previous.name,
                converter = name,
                "converter replaced"
            );
        }
        self.id = next_id();
        Ok(())
    }
}

impl Default for ConversionService {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionService")
            .field("id", &self.id)
            .field("targets", &self.by_target.keys().collect::<Vec<_>>())
            .finish()
    }
}
