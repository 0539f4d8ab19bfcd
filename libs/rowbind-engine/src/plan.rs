use std::fmt;
use std::sync::Arc;

use rowbind_api::error::CoercionError;
use rowbind_api::metadata::{AnyValue, Args, BoxError, DefaultFn, Invocable, TypeKey};
use rowbind_api::naming::NameJoiner;
use rowbind_api::value::Value;

use crate::coercion::{Coercion, Primitive};
use crate::conversion::Converter;
use crate::registry::DeserializerDescriptor;

/// How one parameter gets its argument. Resolved once per plan.
#[derive(Clone)]
pub enum CoercionStrategy {
    /// Parameter declared as `Value`: raw value passed through.
    Identity,
    /// Built-in primitive conversion.
    Builtin(Primitive),
    /// User-defined deserializer declared on the target type.
    Deserializer(Arc<DeserializerDescriptor>),
    /// Converter from the mapper's conversion service.
    Converter(Arc<Converter>),
    /// Column deserialized through another type's one-parameter entry point.
    Nested(Arc<ConstructionPlan>),
    /// Aggregate built from several columns (already prefixed).
    Flatten(Arc<ConstructionPlan>),
    /// Column never read; the declared default is used.
    Default(DefaultFn),
}

impl CoercionStrategy {
    /// Type the raw column value is first converted to. `None` for
    /// strategies that do not read a single column.
    pub fn source(&self) -> Option<TypeKey> {
        match self {
            CoercionStrategy::Identity => Some(TypeKey::of::<Value<'static>>()),
            CoercionStrategy::Builtin(p) => Some(p.type_key()),
            CoercionStrategy::Deserializer(d) => Some(d.source.source()),
            CoercionStrategy::Converter(c) => Some(c.source.source()),
            CoercionStrategy::Nested(plan) => plan.bindings.first().and_then(|b| b.strategy.source()),
            CoercionStrategy::Flatten(_) | CoercionStrategy::Default(_) => None,
        }
    }

    /// Whether a null column reaches this strategy as `Value::Null`: true
    /// when the value is handed over as a raw `Value`, directly or as the
    /// argument of a deserializer or converter.
    pub fn accepts_null(&self) -> bool {
        match self {
            CoercionStrategy::Identity => true,
            CoercionStrategy::Deserializer(d) => d.source == Coercion::Identity,
            CoercionStrategy::Converter(c) => c.source == Coercion::Identity,
            CoercionStrategy::Nested(plan) => {
                plan.bindings.first().is_some_and(|b| b.strategy.accepts_null())
            }
            CoercionStrategy::Builtin(_)
            | CoercionStrategy::Flatten(_)
            | CoercionStrategy::Default(_) => false,
        }
    }

    /// Convert one raw value. Null only for strategies that `accepts_null`.
    ///
    /// Only meaningful for single-column strategies; the binder handles
    /// `Flatten` and `Default` itself.
    pub fn coerce(&self, value: &Value<'_>) -> Result<AnyValue, CoercionError> {
        match self {
            CoercionStrategy::Identity => Ok(Box::new(value.clone().into_owned())),
            CoercionStrategy::Builtin(p) => p.coerce(value),
            CoercionStrategy::Deserializer(d) => d.deserialize(value),
            CoercionStrategy::Converter(c) => c.convert(value),
            CoercionStrategy::Nested(plan) => {
                let inner = plan.bindings.first().ok_or_else(|| {
                    CoercionError::deserializer(format!("{} takes no argument", plan.target))
                })?;
                let mut args = Args::with_capacity(plan.target.name(), 1);
                args.push(Some(inner.strategy.coerce(value)?));
                plan.invoke(args).map_err(|e| {
                    CoercionError::deserializer(e.to_string()).with_context(plan.factory)
                })
            }
            CoercionStrategy::Flatten(plan) => Err(CoercionError::type_mismatch(
                plan.target.name(),
                "a single column",
            )),
            CoercionStrategy::Default(make) => Ok(make()),
        }
    }
}

impl fmt::Debug for CoercionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoercionStrategy::Identity => f.write_str("Identity"),
            CoercionStrategy::Builtin(p) => f.debug_tuple("Builtin").field(p).finish(),
            CoercionStrategy::Deserializer(d) => f.debug_tuple("Deserializer").field(&d.name).finish(),
            CoercionStrategy::Converter(c) => f.debug_tuple("Converter").field(&c.name).finish(),
            CoercionStrategy::Nested(plan) => f.debug_tuple("Nested").field(&plan.target).finish(),
            CoercionStrategy::Flatten(plan) => f.debug_tuple("Flatten").field(&plan.target).finish(),
            CoercionStrategy::Default(_) => f.write_str("Default"),
        }
    }
}

/// One parameter of the chosen constructor/factory, bound to a column.
#[derive(Debug, Clone)]
pub struct ParameterBinding {
    pub parameter: &'static str,
    /// Column read for this parameter; the prefix for `Flatten`.
    pub column: String,
    pub strategy: CoercionStrategy,
    /// An absent column fails the row.
    pub required: bool,
    /// Null (or an absent optional column) becomes `None`.
    pub nullable: bool,
}

/// What the plan invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionStrategy {
    /// The canonical constructor.
    Constructor,
    /// A static factory: the deserializer entry point or an explicitly named one.
    StaticFactory,
}

/// Precomputed recipe turning one row into one instance of `target`.
#[derive(Debug, Clone)]
pub struct ConstructionPlan {
    pub target: TypeKey,
    /// Name of the constructor/factory invoked.
    pub factory: &'static str,
    pub strategy: ConstructionStrategy,
    /// The invoked factory is the type's deserializer entry point.
    pub column_deserializer: bool,
    pub bindings: Vec<ParameterBinding>,
    invoke: Invocable,
}

impl ConstructionPlan {
    pub(crate) fn new(
        target: TypeKey,
        factory: &'static str,
        strategy: ConstructionStrategy,
        column_deserializer: bool,
        bindings: Vec<ParameterBinding>,
        invoke: Invocable,
    ) -> Self {
        Self {
            target,
            factory,
            strategy,
            column_deserializer,
            bindings,
            invoke,
        }
    }

    pub fn invoke(&self, args: Args) -> Result<AnyValue, BoxError> {
        self.invoke.call(args)
    }

    /// Copy of this plan whose columns are prefixed, for flattening.
    pub(crate) fn rebased(&self, prefix: &str, joiner: NameJoiner) -> ConstructionPlan {
        let bindings = self
            .bindings
            .iter()
            .map(|b| ParameterBinding {
                parameter: b.parameter,
                column: joiner.join(prefix, &b.column),
                strategy: match &b.strategy {
                    CoercionStrategy::Flatten(inner) => {
                        CoercionStrategy::Flatten(Arc::new(inner.rebased(prefix, joiner)))
                    }
                    other => other.clone(),
                },
                required: b.required,
                nullable: b.nullable,
            })
            .collect();
        ConstructionPlan {
            bindings,
            ..self.clone()
        }
    }

    /// Every column the plan reads, with the binding path and source type.
    pub fn read_columns(&self) -> Vec<ColumnRead<'_>> {
        let mut out = Vec::new();
        self.collect_reads("", &mut out);
        out
    }

    fn collect_reads<'p>(&'p self, path: &str, out: &mut Vec<ColumnRead<'p>>) {
        for binding in &self.bindings {
            let here = if path.is_empty() {
                binding.parameter.to_string()
            } else {
                format!("{path}.{}", binding.parameter)
            };
            match &binding.strategy {
                CoercionStrategy::Flatten(inner) => inner.collect_reads(&here, out),
                strategy => {
                    if let Some(source) = strategy.source() {
                        out.push(ColumnRead {
                            column: &binding.column,
                            parameter: here,
                            source,
                        });
                    }
                }
            }
        }
    }
}

/// A single column read by a plan.
#[derive(Debug, Clone)]
pub struct ColumnRead<'p> {
    pub column: &'p str,
    /// Dotted parameter path, e.g. `audit.created_at`.
    pub parameter: String,
    pub source: TypeKey,
}
