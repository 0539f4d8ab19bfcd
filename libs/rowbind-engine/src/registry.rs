use std::collections::HashMap;
use std::sync::Arc;

use rowbind_api::error::CoercionError;
use rowbind_api::metadata::{AnyValue, DeserializeFn, TypeKey, TypeMetadata};
use rowbind_api::value::Value;

use crate::coercion::Coercion;
use crate::error::ResolveError;

/// A validated single-argument deserializer for one parameter of `declaring`.
#[derive(Debug, Clone)]
pub struct DeserializerDescriptor {
    pub declaring: TypeKey,
    pub parameter: &'static str,
    pub name: &'static str,
    /// Raw value → deserializer argument.
    pub source: Coercion,
    pub target: TypeKey,
    invoke: DeserializeFn,
}

impl DeserializerDescriptor {
    /// Coerce the raw value to the source type, then run the deserializer.
    pub fn deserialize(&self, value: &Value<'_>) -> Result<AnyValue, CoercionError> {
        let source = self.source.apply(value)?;
        self.invoke
            .call(source)
            .map_err(|e| e.with_context(self.name))
    }
}

/// Deserializers of one type, keyed by the parameter they claim.
#[derive(Debug, Clone, Default)]
pub struct DeserializerSet {
    by_parameter: HashMap<&'static str, Arc<DeserializerDescriptor>>,
}

impl DeserializerSet {
    pub fn get(&self, parameter: &str) -> Option<&Arc<DeserializerDescriptor>> {
        self.by_parameter.get(parameter)
    }

    pub fn len(&self) -> usize {
        self.by_parameter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_parameter.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DeserializerDescriptor>> {
        self.by_parameter.values()
    }
}

/// Collects and validates the deserializers a type declares.
pub struct DeserializerRegistry;

impl DeserializerRegistry {
    /// Scan `metadata` for the deserializer declarations that apply when
    /// `factory` is invoked: type-level ones and those scoped to `factory`.
    ///
    /// Two applicable declarations claiming the same parameter are
    /// ambiguous, whatever their source types: the engine never picks one
    /// silently.
    pub fn register(
        metadata: &TypeMetadata,
        factory: &str,
    ) -> Result<DeserializerSet, ResolveError> {
        let type_name = metadata.key.name();
        let mut set = DeserializerSet::default();

        let applicable = metadata
            .deserializers
            .iter()
            .filter(|decl| decl.factory.is_none_or(|scope| scope == factory));
        for decl in applicable {
            if let Some(existing) = set.by_parameter.get(decl.parameter) {
                return Err(ResolveError::AmbiguousDeserializer {
                    type_name,
                    parameter: decl.parameter.to_string(),
                    first: existing.name.to_string(),
                    second: decl.name.to_string(),
                });
            }

            let source = Coercion::for_type(&decl.source).ok_or_else(|| {
                ResolveError::UnsupportedType {
                    type_name,
                    parameter: format!("{} (argument of {})", decl.parameter, decl.name),
                    declared: decl.source.name(),
                }
            })?;

            set.by_parameter.insert(
                decl.parameter,
                Arc::new(DeserializerDescriptor {
                    declaring: metadata.key,
                    parameter: decl.parameter,
                    name: decl.name,
                    source,
                    target: decl.target,
                    invoke: decl.invoke.clone(),
                }),
            );
        }

        Ok(set)
    }
}
