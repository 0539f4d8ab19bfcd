use std::collections::HashMap;
use std::sync::Arc;

use rowbind_api::RowMapped;
use rowbind_api::metadata::{
    FactoryKind, FactoryMeta, MetadataFn, ParamMeta, ParamShape, TypeKey, TypeMetadata,
};
use rowbind_api::naming::{ColumnNaming, NameJoiner};
use rowbind_api::value::Value;

use crate::cache::{PlanKey, TypeMetadataCache};
use crate::coercion::Primitive;
use crate::config::MapperConfig;
use crate::conversion::{ConversionService, Converter};
use crate::error::ResolveError;
use crate::plan::{ConstructionPlan, ConstructionStrategy, CoercionStrategy, ParameterBinding};
use crate::registry::{DeserializerRegistry, DeserializerSet};

/// Options a plan is resolved with. Part of the cache key.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub naming: ColumnNaming,
    /// Joiner for flattened parameters that do not name their own.
    pub joiner: NameJoiner,
    /// Invoke this factory instead of the default selection.
    pub factory: Option<&'static str>,
    /// Converters for parameter types with no other strategy.
    pub conversions: Option<Arc<ConversionService>>,
}

impl ResolveOptions {
    pub fn with_factory(mut self, factory: &'static str) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_conversions(mut self, conversions: Arc<ConversionService>) -> Self {
        self.conversions = Some(conversions);
        self
    }

    fn key(&self, target: TypeKey, factory: Option<&'static str>) -> PlanKey {
        PlanKey {
            target,
            naming: self.naming,
            joiner: self.joiner,
            factory,
            conversions: self.conversions.as_ref().map(|c| c.id()),
        }
    }
}

impl From<&MapperConfig> for ResolveOptions {
    fn from(config: &MapperConfig) -> Self {
        Self {
            naming: config.naming,
            joiner: config.joiner,
            ..Self::default()
        }
    }
}

/// Turns type metadata into cached construction plans.
pub struct ConstructionPlanResolver<'c> {
    cache: &'c TypeMetadataCache,
    options: ResolveOptions,
}

impl<'c> ConstructionPlanResolver<'c> {
    pub fn new(cache: &'c TypeMetadataCache, options: ResolveOptions) -> Self {
        Self { cache, options }
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Resolve the plan for `T`. Idempotent: later calls return the cached
    /// plan (or the cached failure) without reading `T`'s metadata again.
    pub fn resolve<T: RowMapped>(&self) -> Result<Arc<ConstructionPlan>, ResolveError> {
        let key = self.options.key(TypeKey::of::<T>(), self.options.factory);
        if let Some(resolved) = self.cache.get(&key) {
            return resolved;
        }
        self.resolve_metadata(T::type_metadata)
    }

    /// Resolve from a metadata function, for hand-assembled metadata.
    pub fn resolve_metadata(
        &self,
        metadata: MetadataFn,
    ) -> Result<Arc<ConstructionPlan>, ResolveError> {
        let root = metadata();
        let key = self.options.key(root.key, self.options.factory);
        if let Some(resolved) = self.cache.get(&key) {
            return resolved;
        }
        check_acyclic(&root, self.options.factory)?;
        self.resolve_checked(root, self.options.factory)
    }

    fn resolve_checked(
        &self,
        metadata: TypeMetadata,
        factory: Option<&'static str>,
    ) -> Result<Arc<ConstructionPlan>, ResolveError> {
        let key = self.options.key(metadata.key, factory);
        self.cache
            .get_or_build(key, || self.build(&metadata, factory))
    }

    fn build(
        &self,
        metadata: &TypeMetadata,
        factory: Option<&'static str>,
    ) -> Result<ConstructionPlan, ResolveError> {
        let type_name = metadata.key.name();
        let selected = select_factory(metadata, factory)?;
        let deserializers = DeserializerRegistry::register(metadata, selected.name)?;

        for descriptor in deserializers.iter() {
            if !selected.params.iter().any(|p| p.name == descriptor.parameter) {
                tracing::warn!(
                    target_type = type_name,
                    factory = selected.name,
                    parameter = descriptor.parameter,
                    deserializer = descriptor.name,
                    "deserializer claims a parameter the selected factory does not have"
                );
            }
        }

        let bindings = selected
            .params
            .iter()
            .map(|param| self.bind_param(metadata.key, &deserializers, param))
            .collect::<Result<Vec<_>, _>>()?;

        let strategy = match selected.kind {
            FactoryKind::Constructor { .. } => ConstructionStrategy::Constructor,
            FactoryKind::StaticFactory => ConstructionStrategy::StaticFactory,
        };
        let plan = ConstructionPlan::new(
            metadata.key,
            selected.name,
            strategy,
            selected.deserializer_entry,
            bindings,
            selected.invoke.clone(),
        );
        check_conflicts(&plan)?;

        tracing::debug!(
            target_type = type_name,
            factory = plan.factory,
            strategy = ?plan.strategy,
            bindings = plan.bindings.len(),
            naming = ?self.options.naming,
            "built construction plan"
        );
        Ok(plan)
    }

    fn bind_param(
        &self,
        declaring: TypeKey,
        deserializers: &DeserializerSet,
        param: &ParamMeta,
    ) -> Result<ParameterBinding, ResolveError> {
        let type_name = declaring.name();
        let column = match param.alias {
            Some(alias) => alias.to_string(),
            None => self.options.naming.apply(param.name),
        };
        let claimed = deserializers.get(param.name);
        let ambiguous = |second: String| {
            claimed.map(|d| ResolveError::AmbiguousDeserializer {
                type_name,
                parameter: param.name.to_string(),
                first: d.name.to_string(),
                second,
            })
        };

        let strategy = match &param.shape {
            ParamShape::Default(make) => {
                if let Some(err) = ambiguous("default value".to_string()) {
                    return Err(err);
                }
                CoercionStrategy::Default(*make)
            }
            ParamShape::Nested(nested) => {
                if let Some(err) = ambiguous(format!("nested {}", param.declared)) {
                    return Err(err);
                }
                let plan = self.resolve_checked(nested(), None)?;
                expect_target(type_name, param, &plan)?;
                if !plan.column_deserializer
                    || plan.bindings.len() != 1
                    || plan.bindings[0].strategy.source().is_none()
                {
                    return Err(ResolveError::no_strategy(
                        plan.target.name(),
                        format!(
                            "nested in '{}' of {type_name}: needs a deserializer entry point taking exactly one column",
                            param.name
                        ),
                    ));
                }
                CoercionStrategy::Nested(plan)
            }
            ParamShape::Flatten { metadata, joiner } => {
                if let Some(err) = ambiguous(format!("flattened {}", param.declared)) {
                    return Err(err);
                }
                let plan = self.resolve_checked(metadata(), None)?;
                expect_target(type_name, param, &plan)?;
                let joiner = joiner.unwrap_or(self.options.joiner);
                CoercionStrategy::Flatten(Arc::new(plan.rebased(&column, joiner)))
            }
            ParamShape::Column => match claimed {
                Some(descriptor) => {
                    if descriptor.target != param.declared {
                        return Err(ResolveError::DeserializerMismatch {
                            type_name,
                            parameter: param.name.to_string(),
                            deserializer: descriptor.name.to_string(),
                            produced: descriptor.target.name(),
                            expected: param.declared.name(),
                        });
                    }
                    CoercionStrategy::Deserializer(Arc::clone(descriptor))
                }
                None if param.declared.is::<Value<'static>>() => CoercionStrategy::Identity,
                None => match Primitive::for_type(&param.declared) {
                    Some(primitive) => CoercionStrategy::Builtin(primitive),
                    None => match self.converter_for(&param.declared) {
                        Some(converter) => CoercionStrategy::Converter(converter),
                        None => {
                            return Err(ResolveError::UnsupportedType {
                                type_name,
                                parameter: param.name.to_string(),
                                declared: param.declared.name(),
                            });
                        }
                    },
                },
            },
        };

        let defaulted = matches!(strategy, CoercionStrategy::Default(_));
        Ok(ParameterBinding {
            parameter: param.name,
            column,
            strategy,
            required: !param.nullable && !defaulted,
            nullable: param.nullable,
        })
    }

    fn converter_for(&self, declared: &TypeKey) -> Option<Arc<Converter>> {
        self.options
            .conversions
            .as_ref()
            .and_then(|service| service.get(declared))
            .map(Arc::clone)
    }
}

fn expect_target(
    type_name: &'static str,
    param: &ParamMeta,
    plan: &ConstructionPlan,
) -> Result<(), ResolveError> {
    if plan.target == param.declared {
        Ok(())
    } else {
        Err(ResolveError::UnsupportedType {
            type_name,
            parameter: param.name.to_string(),
            declared: param.declared.name(),
        })
    }
}

/// Pick the constructor or factory a plan invokes.
///
/// An explicit name must match exactly one factory. Otherwise a single
/// deserializer entry point wins over the primary constructor; several
/// candidates at the same level are a tie and fail.
pub fn select_factory<'m>(
    metadata: &'m TypeMetadata,
    explicit: Option<&str>,
) -> Result<&'m FactoryMeta, ResolveError> {
    let type_name = metadata.key.name();

    if let Some(name) = explicit {
        let named: Vec<_> = metadata.factories.iter().filter(|f| f.name == name).collect();
        return match named.as_slice() {
            [only] => Ok(*only),
            [] => Err(ResolveError::no_strategy(
                type_name,
                format!("no factory named '{name}'"),
            )),
            _ => Err(ResolveError::no_strategy(
                type_name,
                format!("{} factories named '{name}'", named.len()),
            )),
        };
    }

    let entries: Vec<_> = metadata
        .factories
        .iter()
        .filter(|f| f.deserializer_entry)
        .collect();
    match entries.as_slice() {
        [only] => return Ok(*only),
        [] => {}
        _ => {
            return Err(ResolveError::no_strategy(
                type_name,
                format!(
                    "deserializer entry points tie: {}",
                    entries.iter().map(|f| f.name).collect::<Vec<_>>().join(", ")
                ),
            ));
        }
    }

    let primaries: Vec<_> = metadata
        .factories
        .iter()
        .filter(|f| matches!(f.kind, FactoryKind::Constructor { primary: true }))
        .collect();
    match primaries.as_slice() {
        [only] => Ok(*only),
        [] => Err(ResolveError::no_strategy(
            type_name,
            "no primary constructor and no deserializer entry point",
        )),
        _ => Err(ResolveError::no_strategy(
            type_name,
            format!("{} primary constructors", primaries.len()),
        )),
    }
}

/// Walk the nested/flatten graph reachable from `root` through the factories
/// that would be selected, failing on the first type met twice on a path.
fn check_acyclic(root: &TypeMetadata, factory: Option<&str>) -> Result<(), ResolveError> {
    let mut path = vec![root.key];
    visit(root, factory, &mut path)
}

fn visit(
    metadata: &TypeMetadata,
    factory: Option<&str>,
    path: &mut Vec<TypeKey>,
) -> Result<(), ResolveError> {
    // Selection failures surface with a better message during the build.
    let Ok(selected) = select_factory(metadata, factory) else {
        return Ok(());
    };

    for param in &selected.params {
        let nested = match &param.shape {
            ParamShape::Nested(f) | ParamShape::Flatten { metadata: f, .. } => f(),
            ParamShape::Column | ParamShape::Default(_) => continue,
        };
        if path.contains(&nested.key) {
            path.push(nested.key);
            let rendered = path.iter().map(|k| k.name()).collect::<Vec<_>>().join(" -> ");
            return Err(ResolveError::RecursiveType {
                type_name: path[0].name(),
                path: rendered,
            });
        }
        path.push(nested.key);
        visit(&nested, None, path)?;
        path.pop();
    }
    Ok(())
}

/// Two leaf reads of one column must agree on the source type.
fn check_conflicts(plan: &ConstructionPlan) -> Result<(), ResolveError> {
    let mut seen: HashMap<&str, (String, TypeKey)> = HashMap::new();
    for read in plan.read_columns() {
        match seen.get(read.column) {
            Some((first, source)) if *source != read.source => {
                return Err(ResolveError::ConflictingBinding {
                    type_name: plan.target.name(),
                    column: read.column.to_string(),
                    first: first.clone(),
                    first_source: source.name(),
                    second: read.parameter,
                    second_source: read.source.name(),
                });
            }
            Some(_) => {}
            None => {
                seen.insert(read.column, (read.parameter, read.source));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rowbind_api::metadata::{AnyValue, FactoryMeta, Invocable};

    use super::*;

    struct Foo;

    fn factory(name: &'static str, kind: FactoryKind, entry: bool) -> FactoryMeta {
        FactoryMeta {
            name,
            kind,
            deserializer_entry: entry,
            params: Vec::new(),
            invoke: Invocable::new(|_| Ok(Box::new(Foo) as AnyValue)),
        }
    }

    fn primary() -> FactoryMeta {
        factory("Foo", FactoryKind::Constructor { primary: true }, false)
    }

    #[test]
    fn entry_point_beats_primary_constructor() {
        let metadata = TypeMetadata::of::<Foo>()
            .with_factory(primary())
            .with_factory(factory("parse", FactoryKind::StaticFactory, true))
            .with_factory(factory("other", FactoryKind::StaticFactory, false));

        assert_eq!(select_factory(&metadata, None).expect("select").name, "parse");
        assert_eq!(select_factory(&metadata, Some("other")).expect("named").name, "other");
        assert_eq!(select_factory(&metadata, Some("Foo")).expect("named").name, "Foo");
    }

    #[test]
    fn primary_constructor_is_the_fallback() {
        let metadata = TypeMetadata::of::<Foo>()
            .with_factory(factory("other", FactoryKind::StaticFactory, false))
            .with_factory(primary());
        assert_eq!(select_factory(&metadata, None).expect("select").name, "Foo");
    }

    #[test]
    fn ties_and_absence_fail() {
        let tie = TypeMetadata::of::<Foo>()
            .with_factory(factory("a", FactoryKind::StaticFactory, true))
            .with_factory(factory("b", FactoryKind::StaticFactory, true));
        assert!(matches!(
            select_factory(&tie, None),
            Err(ResolveError::NoConstructionStrategy { .. })
        ));

        let secondary_only = TypeMetadata::of::<Foo>().with_factory(factory(
            "Foo",
            FactoryKind::Constructor { primary: false },
            false,
        ));
        assert!(select_factory(&secondary_only, None).is_err());

        let metadata = TypeMetadata::of::<Foo>().with_factory(primary());
        assert!(select_factory(&metadata, Some("missing")).is_err());
    }
}
