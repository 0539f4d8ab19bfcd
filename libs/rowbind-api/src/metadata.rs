//! Type metadata consumed by the engine.
//!
//! Rust has no runtime reflection, so `#[derive(RowMapped)]` and
//! `#[row_factories]` describe a type's constructors, factories, parameters
//! and deserializers as plain data at compile time. The engine validates and
//! resolves this description at run time; the macros never decide anything.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

pub use crate::error::BoxError;
use crate::error::CoercionError;
pub use crate::naming::NameJoiner;

/// Type-erased value flowing between coercions and invocables.
pub type AnyValue = Box<dyn Any + Send>;

/// Builds the metadata of a nested type. Stored as a function pointer so
/// nested metadata is only materialized when a plan is resolved.
pub type MetadataFn = fn() -> TypeMetadata;

/// Produces the value of a `#[row(default)]` parameter.
pub type DefaultFn = fn() -> AnyValue;

/// Identity of a Rust type. Equality and hashing use `TypeId` only.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Coerced arguments for one constructor/factory call, in parameter order.
///
/// A `None` slot is a SQL null (or an absent optional column).
pub struct Args {
    type_name: &'static str,
    slots: Vec<Option<AnyValue>>,
}

impl Args {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            slots: Vec::new(),
        }
    }

    pub fn with_capacity(type_name: &'static str, capacity: usize) -> Self {
        Self {
            type_name,
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, slot: Option<AnyValue>) {
        self.slots.push(slot);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Take a non-null argument.
    pub fn take<T: 'static>(&mut self, index: usize) -> Result<T, BoxError> {
        match self.take_nullable(index)? {
            Some(v) => Ok(v),
            None => Err(CoercionError::type_mismatch(std::any::type_name::<T>(), "null")
                .with_context(format!("{} argument {index}", self.type_name))
                .into()),
        }
    }

    /// Take an argument whose parameter is declared `Option<T>`.
    pub fn take_nullable<T: 'static>(&mut self, index: usize) -> Result<Option<T>, BoxError> {
        let type_name = self.type_name;
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            CoercionError::type_mismatch(std::any::type_name::<T>(), "no argument")
                .with_context(format!("{type_name} argument {index}"))
        })?;
        match slot.take() {
            None => Ok(None),
            Some(value) => match value.downcast::<T>() {
                Ok(v) => Ok(Some(*v)),
                Err(_) => Err(CoercionError::type_mismatch(
                    std::any::type_name::<T>(),
                    "a value of another type",
                )
                .with_context(format!("{type_name} argument {index}"))
                .into()),
            },
        }
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("type_name", &self.type_name)
            .field("len", &self.slots.len())
            .finish()
    }
}

/// Handle to a constructor or factory, captured once and called per row.
#[derive(Clone)]
pub struct Invocable(Arc<dyn Fn(Args) -> Result<AnyValue, BoxError> + Send + Sync>);

impl Invocable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Args) -> Result<AnyValue, BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, args: Args) -> Result<AnyValue, BoxError> {
        (self.0)(args)
    }
}

impl fmt::Debug for Invocable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invocable")
    }
}

/// Handle to a single-argument deserializer.
#[derive(Clone)]
pub struct DeserializeFn(Arc<dyn Fn(AnyValue) -> Result<AnyValue, CoercionError> + Send + Sync>);

impl DeserializeFn {
    /// Erase a typed `S → T` conversion.
    pub fn new<S, T, F>(f: F) -> Self
    where
        S: Send + 'static,
        T: Send + 'static,
        F: Fn(S) -> Result<T, CoercionError> + Send + Sync + 'static,
    {
        Self(Arc::new(move |source: AnyValue| {
            let source = source.downcast::<S>().map_err(|_| {
                CoercionError::type_mismatch(std::any::type_name::<S>(), "a value of another type")
            })?;
            f(*source).map(|v| Box::new(v) as AnyValue)
        }))
    }

    pub fn call(&self, source: AnyValue) -> Result<AnyValue, CoercionError> {
        (self.0)(source)
    }
}

impl fmt::Debug for DeserializeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeserializeFn")
    }
}

/// A configured, reusable column deserializer (`#[row(deserialize_with = "...")]`).
///
/// ```ignore
/// struct Timestamp { pattern: &'static str }
///
/// impl ColumnDeserializer for Timestamp {
///     type Source = String;
///     type Target = NaiveDateTime;
///
///     fn deserialize(&self, source: String) -> Result<NaiveDateTime, CoercionError> {
///         NaiveDateTime::parse_from_str(&source, self.pattern)
///             .map_err(|e| CoercionError::deserializer(e.to_string()))
///     }
/// }
/// ```
pub trait ColumnDeserializer: Send + Sync + 'static {
    type Source: Send + 'static;
    type Target: Send + 'static;

    fn deserialize(&self, source: Self::Source) -> Result<Self::Target, CoercionError>;
}

/// How a parameter is fed from the row.
#[derive(Clone)]
pub enum ParamShape {
    /// One column, coercion chosen by the resolver.
    Column,
    /// One column, deserialized through the nested type's deserializer entry point.
    Nested(MetadataFn),
    /// Several columns, prefixed with this parameter's column name.
    Flatten {
        metadata: MetadataFn,
        joiner: Option<NameJoiner>,
    },
    /// Never read from the row.
    Default(DefaultFn),
}

impl fmt::Debug for ParamShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamShape::Column => f.write_str("Column"),
            ParamShape::Nested(_) => f.write_str("Nested"),
            ParamShape::Flatten { joiner, .. } => {
                f.debug_struct("Flatten").field("joiner", joiner).finish()
            }
            ParamShape::Default(_) => f.write_str("Default"),
        }
    }
}

/// One declared parameter of a constructor or factory.
#[derive(Debug, Clone)]
pub struct ParamMeta {
    pub name: &'static str,
    /// Explicit column name; bypasses column naming.
    pub alias: Option<&'static str>,
    /// Declared type with `Option` stripped.
    pub declared: TypeKey,
    pub nullable: bool,
    pub shape: ParamShape,
}

impl ParamMeta {
    /// Plain column parameter of type `T`.
    pub fn column<T: 'static>(name: &'static str) -> Self {
        Self {
            name,
            alias: None,
            declared: TypeKey::of::<T>(),
            nullable: false,
            shape: ParamShape::Column,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn shape(mut self, shape: ParamShape) -> Self {
        self.shape = shape;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryKind {
    /// A constructor; `primary` marks the canonical one.
    Constructor { primary: bool },
    /// An associated function returning the type.
    StaticFactory,
}

/// A constructor or static factory able to build the type.
#[derive(Debug, Clone)]
pub struct FactoryMeta {
    pub name: &'static str,
    pub kind: FactoryKind,
    /// Marked as the type's deserializer entry point.
    pub deserializer_entry: bool,
    pub params: Vec<ParamMeta>,
    pub invoke: Invocable,
}

/// A single-argument deserializer claiming one parameter of the declaring type.
#[derive(Debug, Clone)]
pub struct DeserializerMeta {
    pub name: &'static str,
    pub parameter: &'static str,
    /// Restricts the claim to one factory's parameter. `None` claims the
    /// parameter of whichever factory is invoked.
    pub factory: Option<&'static str>,
    pub source: TypeKey,
    pub target: TypeKey,
    pub invoke: DeserializeFn,
}

impl DeserializerMeta {
    pub fn from_fn<S, T, E, F>(name: &'static str, parameter: &'static str, f: F) -> Self
    where
        S: Send + 'static,
        T: Send + 'static,
        E: fmt::Display,
        F: Fn(S) -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            name,
            parameter,
            factory: None,
            source: TypeKey::of::<S>(),
            target: TypeKey::of::<T>(),
            invoke: DeserializeFn::new(move |s: S| {
                f(s).map_err(|e| CoercionError::deserializer(e.to_string()))
            }),
        }
    }

    pub fn from_infallible<S, T, F>(name: &'static str, parameter: &'static str, f: F) -> Self
    where
        S: Send + 'static,
        T: Send + 'static,
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        Self {
            name,
            parameter,
            factory: None,
            source: TypeKey::of::<S>(),
            target: TypeKey::of::<T>(),
            invoke: DeserializeFn::new(move |s: S| Ok(f(s))),
        }
    }

    /// Claim `parameter` only when `factory` is the one invoked.
    pub fn scoped(mut self, factory: &'static str) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Deserialize text through `FromStr` (`#[row(parse)]`).
    pub fn parse<T>(parameter: &'static str) -> Self
    where
        T: FromStr + Send + 'static,
        T::Err: fmt::Display,
    {
        Self::from_fn("FromStr::from_str", parameter, |s: String| s.parse::<T>())
    }

    pub fn from_deserializer<D: ColumnDeserializer>(
        name: &'static str,
        parameter: &'static str,
        deserializer: D,
    ) -> Self {
        Self {
            name,
            parameter,
            factory: None,
            source: TypeKey::of::<D::Source>(),
            target: TypeKey::of::<D::Target>(),
            invoke: DeserializeFn::new(move |s: D::Source| deserializer.deserialize(s)),
        }
    }
}

/// Factories and deserializers declared in a `#[row_factories]` impl block.
#[derive(Debug, Clone, Default)]
pub struct FactorySet {
    pub factories: Vec<FactoryMeta>,
    pub deserializers: Vec<DeserializerMeta>,
}

/// Everything the engine knows about a target type.
#[derive(Debug, Clone)]
pub struct TypeMetadata {
    pub key: TypeKey,
    pub factories: Vec<FactoryMeta>,
    pub deserializers: Vec<DeserializerMeta>,
}

impl TypeMetadata {
    pub fn new(key: TypeKey) -> Self {
        Self {
            key,
            factories: Vec::new(),
            deserializers: Vec::new(),
        }
    }

    pub fn of<T: 'static>() -> Self {
        Self::new(TypeKey::of::<T>())
    }

    pub fn add_factory(&mut self, factory: FactoryMeta) {
        self.factories.push(factory);
    }

    pub fn add_deserializer(&mut self, deserializer: DeserializerMeta) {
        self.deserializers.push(deserializer);
    }

    pub fn with_factory(mut self, factory: FactoryMeta) -> Self {
        self.add_factory(factory);
        self
    }

    pub fn with_deserializer(mut self, deserializer: DeserializerMeta) -> Self {
        self.add_deserializer(deserializer);
        self
    }

    pub fn extend(&mut self, set: FactorySet) {
        self.factories.extend(set.factories);
        self.deserializers.extend(set.deserializers);
    }
}

/// A type the engine can construct from rows.
///
/// Implemented by `#[derive(RowMapped)]`; hand-written implementations are
/// validated exactly like generated ones.
pub trait RowMapped: Sized + Send + 'static {
    fn type_metadata() -> TypeMetadata;
}

/// Implemented by `#[row_factories]` on an inherent impl block.
pub trait DeclaredFactories {
    fn declared_factories() -> FactorySet;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_take_by_type() {
        let mut args = Args::new("Dst");
        args.push(Some(Box::new(1i32)));
        args.push(None);
        args.push(Some(Box::new(String::from("x"))));

        assert_eq!(args.take::<i32>(0).expect("i32"), 1);
        assert_eq!(args.take_nullable::<String>(1).expect("null"), None);
        assert!(args.take::<i64>(2).is_err());
        assert!(args.take::<String>(7).is_err());
    }

    #[test]
    fn deserializer_meta_records_source_and_target() {
        let meta = DeserializerMeta::from_fn("double", "n", |s: i64| Ok::<_, String>(s * 2));
        assert_eq!(meta.factory, None);
        assert_eq!(meta.clone().scoped("Foo").factory, Some("Foo"));
        assert!(meta.source.is::<i64>());
        assert!(meta.target.is::<i64>());

        let out = meta.invoke.call(Box::new(21i64)).expect("call");
        assert_eq!(*out.downcast::<i64>().expect("i64"), 42);

        let err = meta.invoke.call(Box::new("no")).expect_err("wrong source");
        assert_eq!(err.kind, crate::error::ErrorKind::TypeMismatch);
    }

    #[test]
    fn parse_deserializer_reports_failures() {
        let meta = DeserializerMeta::parse::<u16>("port");
        assert!(meta.source.is::<String>());
        let err = meta
            .invoke
            .call(Box::new(String::from("http")))
            .expect_err("not a number");
        assert_eq!(err.kind, crate::error::ErrorKind::Deserializer);
    }
}
