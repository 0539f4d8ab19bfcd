use std::num::ParseIntError;
use std::str::FromStr;

use rowbind_api::error::CoercionError;
use rowbind_api::metadata::{AnyValue, TypeKey};
use rowbind_api::value::Value;

/// Parameter types with a built-in conversion from raw column values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
    String,
    Bytes,
}

impl Primitive {
    pub const ALL: [Primitive; 14] = [
        Primitive::Bool,
        Primitive::I8,
        Primitive::I16,
        Primitive::I32,
        Primitive::I64,
        Primitive::U8,
        Primitive::U16,
        Primitive::U32,
        Primitive::U64,
        Primitive::F32,
        Primitive::F64,
        Primitive::Char,
        Primitive::String,
        Primitive::Bytes,
    ];

    pub fn type_key(&self) -> TypeKey {
        match self {
            Primitive::Bool => TypeKey::of::<bool>(),
            Primitive::I8 => TypeKey::of::<i8>(),
            Primitive::I16 => TypeKey::of::<i16>(),
            Primitive::I32 => TypeKey::of::<i32>(),
            Primitive::I64 => TypeKey::of::<i64>(),
            Primitive::U8 => TypeKey::of::<u8>(),
            Primitive::U16 => TypeKey::of::<u16>(),
            Primitive::U32 => TypeKey::of::<u32>(),
            Primitive::U64 => TypeKey::of::<u64>(),
            Primitive::F32 => TypeKey::of::<f32>(),
            Primitive::F64 => TypeKey::of::<f64>(),
            Primitive::Char => TypeKey::of::<char>(),
            Primitive::String => TypeKey::of::<String>(),
            Primitive::Bytes => TypeKey::of::<Vec<u8>>(),
        }
    }

    pub fn for_type(key: &TypeKey) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.type_key() == *key)
    }

    /// Convert a non-null raw value into this primitive, boxed.
    pub fn coerce(&self, value: &Value<'_>) -> Result<AnyValue, CoercionError> {
        Ok(match self {
            Primitive::Bool => boxed(to_bool(value)?),
            Primitive::I8 => boxed(to_int::<i8>(value)?),
            Primitive::I16 => boxed(to_int::<i16>(value)?),
            Primitive::I32 => boxed(to_int::<i32>(value)?),
            Primitive::I64 => boxed(to_int::<i64>(value)?),
            Primitive::U8 => boxed(to_int::<u8>(value)?),
            Primitive::U16 => boxed(to_int::<u16>(value)?),
            Primitive::U32 => boxed(to_int::<u32>(value)?),
            Primitive::U64 => boxed(to_int::<u64>(value)?),
            Primitive::F32 => boxed(to_f32(value)?),
            Primitive::F64 => boxed(to_f64(value)?),
            Primitive::Char => boxed(to_char(value)?),
            Primitive::String => boxed(to_string(value)?),
            Primitive::Bytes => boxed(to_bytes(value)?),
        })
    }
}

/// Raw value → source value of a parameter or deserializer argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// The declared type is `Value` itself.
    Identity,
    Builtin(Primitive),
}

impl Coercion {
    pub fn for_type(key: &TypeKey) -> Option<Self> {
        if key.is::<Value<'static>>() {
            Some(Coercion::Identity)
        } else {
            Primitive::for_type(key).map(Coercion::Builtin)
        }
    }

    pub fn source(&self) -> TypeKey {
        match self {
            Coercion::Identity => TypeKey::of::<Value<'static>>(),
            Coercion::Builtin(p) => p.type_key(),
        }
    }

    pub fn apply(&self, value: &Value<'_>) -> Result<AnyValue, CoercionError> {
        match self {
            Coercion::Identity => Ok(boxed(value.clone().into_owned())),
            Coercion::Builtin(p) => p.coerce(value),
        }
    }
}

fn boxed<T: Send + 'static>(v: T) -> AnyValue {
    Box::new(v)
}

fn to_int<T>(value: &Value<'_>) -> Result<T, CoercionError>
where
    T: TryFrom<i64> + TryFrom<u64> + FromStr<Err = ParseIntError>,
{
    let target = std::any::type_name::<T>();
    let overflow = |v: &dyn std::fmt::Display| {
        CoercionError::overflow(format!("{v} does not fit in {target}"))
    };
    match value {
        Value::Int64(v) => <T as TryFrom<i64>>::try_from(*v).map_err(|_| overflow(v)),
        Value::UInt64(v) => <T as TryFrom<u64>>::try_from(*v).map_err(|_| overflow(v)),
        Value::Float64(v) if v.is_finite() && v.fract() == 0.0 => {
            if *v >= i64::MIN as f64 && *v < i64::MAX as f64 {
                <T as TryFrom<i64>>::try_from(*v as i64).map_err(|_| overflow(v))
            } else {
                Err(overflow(v))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<T>()
            .map_err(|e| CoercionError::parse(format!("{s:?} as {target}: {e}"))),
        other => Err(CoercionError::type_mismatch(target, other.kind())),
    }
}

/// Every integer up to these magnitudes is exactly representable.
const F64_EXACT: u64 = 1 << 53;
const F32_EXACT: u64 = 1 << 24;

/// Integers past the float's exact range would be rounded silently.
fn exact_integer(
    magnitude: u64,
    limit: u64,
    shown: &dyn std::fmt::Display,
    target: &str,
) -> Result<(), CoercionError> {
    if magnitude <= limit {
        Ok(())
    } else {
        Err(CoercionError::overflow(format!("{shown} has no exact {target} representation")))
    }
}

/// Text that parses to infinity without spelling it overflowed the target.
fn finite_text(infinite: bool, text: &str, target: &str) -> Result<(), CoercionError> {
    let digits = text.trim().trim_start_matches(['+', '-']);
    if infinite && !digits.eq_ignore_ascii_case("inf") && !digits.eq_ignore_ascii_case("infinity") {
        Err(CoercionError::overflow(format!("{text:?} is out of range for {target}")))
    } else {
        Ok(())
    }
}

fn to_f64(value: &Value<'_>) -> Result<f64, CoercionError> {
    match value {
        Value::Float64(v) => Ok(*v),
        Value::Int64(v) => exact_integer(v.unsigned_abs(), F64_EXACT, v, "f64").map(|()| *v as f64),
        Value::UInt64(v) => exact_integer(*v, F64_EXACT, v, "f64").map(|()| *v as f64),
        Value::String(s) => {
            let v = s.trim().parse::<f64>()?;
            finite_text(v.is_infinite(), s, "f64")?;
            Ok(v)
        }
        other => Err(CoercionError::type_mismatch("f64", other.kind())),
    }
}

fn to_f32(value: &Value<'_>) -> Result<f32, CoercionError> {
    match value {
        Value::Float64(v) => {
            let narrowed = *v as f32;
            if v.is_finite() && narrowed.is_infinite() {
                Err(CoercionError::overflow(format!("{v} is out of range for f32")))
            } else {
                Ok(narrowed)
            }
        }
        Value::Int64(v) => exact_integer(v.unsigned_abs(), F32_EXACT, v, "f32").map(|()| *v as f32),
        Value::UInt64(v) => exact_integer(*v, F32_EXACT, v, "f32").map(|()| *v as f32),
        Value::String(s) => {
            let v = s.trim().parse::<f32>()?;
            finite_text(v.is_infinite(), s, "f32")?;
            Ok(v)
        }
        other => Err(CoercionError::type_mismatch("f32", other.kind())),
    }
}

fn to_bool(value: &Value<'_>) -> Result<bool, CoercionError> {
    match value {
        Value::Bool(v) => Ok(*v),
        Value::Int64(0) | Value::UInt64(0) => Ok(false),
        Value::Int64(1) | Value::UInt64(1) => Ok(true),
        Value::Int64(v) => Err(CoercionError::parse(format!("{v} is not a boolean"))),
        Value::UInt64(v) => Err(CoercionError::parse(format!("{v} is not a boolean"))),
        Value::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if s.eq_ignore_ascii_case("false") {
                Ok(false)
            } else {
                Err(CoercionError::parse(format!("{s:?} is not a boolean")))
            }
        }
        other => Err(CoercionError::type_mismatch("bool", other.kind())),
    }
}

fn to_char(value: &Value<'_>) -> Result<char, CoercionError> {
    match value {
        Value::String(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(CoercionError::parse(format!("{s:?} is not a single character"))),
            }
        }
        other => Err(CoercionError::type_mismatch("char", other.kind())),
    }
}

fn to_string(value: &Value<'_>) -> Result<String, CoercionError> {
    match value {
        Value::String(s) => Ok(s.to_string()),
        Value::Int64(v) => Ok(v.to_string()),
        Value::UInt64(v) => Ok(v.to_string()),
        Value::Float64(v) => Ok(v.to_string()),
        Value::Bool(v) => Ok(v.to_string()),
        Value::Bytes(b) => Ok(std::str::from_utf8(b)?.to_string()),
        Value::Null => Err(CoercionError::type_mismatch("String", "null")),
    }
}

fn to_bytes(value: &Value<'_>) -> Result<Vec<u8>, CoercionError> {
    match value {
        Value::Bytes(b) => Ok(b.to_vec()),
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        other => Err(CoercionError::type_mismatch("Vec<u8>", other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use rowbind_api::error::ErrorKind;

    use super::*;

    fn coerce<T: 'static>(value: Value<'_>) -> Result<T, CoercionError> {
        let primitive = Primitive::for_type(&TypeKey::of::<T>()).expect("primitive");
        primitive
            .coerce(&value)
            .map(|v| *v.downcast::<T>().expect("coerced to declared type"))
    }

    /// `coerce(serialize(v)) == v`, both for the native value and its text.
    fn assert_round_trip<T>(v: T)
    where
        T: Clone + PartialEq + std::fmt::Debug + ToString + Into<Value<'static>> + 'static,
    {
        assert_eq!(coerce::<T>(v.clone().into()).expect("native"), v);
        assert_eq!(coerce::<T>(Value::from(v.to_string())).expect("text"), v);
    }

    #[test]
    fn primitives_round_trip() {
        assert_round_trip(true);
        assert_round_trip(false);
        assert_round_trip(i8::MIN);
        assert_round_trip(-32_000i16);
        assert_round_trip(42i32);
        assert_round_trip(i64::MAX);
        assert_round_trip(u8::MAX);
        assert_round_trip(65_000u16);
        assert_round_trip(4_000_000_000u32);
        assert_round_trip(u64::MAX);
        assert_round_trip(0.1f32);
        assert_round_trip(-1234.5678f64);
        assert_round_trip('λ');
        assert_round_trip(String::from("str"));

        let bytes = vec![0u8, 159, 146, 150];
        assert_eq!(coerce::<Vec<u8>>(Value::from(bytes.clone())).expect("bytes"), bytes);
    }

    #[test]
    fn string_from_scalars() {
        assert_eq!(coerce::<String>(Value::from(42)).expect("int"), "42");
        assert_eq!(coerce::<String>(Value::from(true)).expect("bool"), "true");
        assert_eq!(coerce::<String>(Value::from(&b"abc"[..])).expect("utf8 bytes"), "abc");
    }

    #[test]
    fn integer_overflow_is_reported() {
        let err = coerce::<i8>(Value::from(300)).expect_err("overflow");
        assert_eq!(err.kind, ErrorKind::Overflow);

        let err = coerce::<u32>(Value::from(-1)).expect_err("negative");
        assert_eq!(err.kind, ErrorKind::Overflow);

        let err = coerce::<i64>(Value::from(u64::MAX)).expect_err("too large");
        assert_eq!(err.kind, ErrorKind::Overflow);
    }

    #[test]
    fn floats_out_of_range_overflow() {
        let err = coerce::<f32>(Value::Float64(1e300)).expect_err("too large for f32");
        assert_eq!(err.kind, ErrorKind::Overflow);
        let err = coerce::<f32>(Value::from("-1e300")).expect_err("text too large for f32");
        assert_eq!(err.kind, ErrorKind::Overflow);
        let err = coerce::<f64>(Value::from("1e400")).expect_err("text too large for f64");
        assert_eq!(err.kind, ErrorKind::Overflow);

        assert_eq!(coerce::<f32>(Value::Float64(f64::INFINITY)).expect("infinity"), f32::INFINITY);
        assert_eq!(coerce::<f64>(Value::from("-inf")).expect("spelled"), f64::NEG_INFINITY);
        assert!(coerce::<f32>(Value::Float64(f64::NAN)).expect("nan").is_nan());
    }

    #[test]
    fn integers_must_be_exact_as_floats() {
        let limit = 1i64 << 53;
        assert_eq!(coerce::<f64>(Value::from(limit)).expect("2^53"), limit as f64);
        assert_eq!(coerce::<f64>(Value::from(-limit)).expect("-2^53"), -limit as f64);

        let err = coerce::<f64>(Value::from(limit + 1)).expect_err("rounded");
        assert_eq!(err.kind, ErrorKind::Overflow);
        let err = coerce::<f64>(Value::from(i64::MAX)).expect_err("i64::MAX");
        assert_eq!(err.kind, ErrorKind::Overflow);
        let err = coerce::<f64>(Value::from(u64::MAX)).expect_err("u64::MAX");
        assert_eq!(err.kind, ErrorKind::Overflow);

        assert_eq!(coerce::<f32>(Value::from(16_777_216)).expect("2^24"), 16_777_216.0);
        let err = coerce::<f32>(Value::from(16_777_217)).expect_err("rounded in f32");
        assert_eq!(err.kind, ErrorKind::Overflow);
    }

    #[test]
    fn integral_floats_become_integers() {
        assert_eq!(coerce::<i32>(Value::from(7.0)).expect("integral"), 7);
        let err = coerce::<i32>(Value::from(7.5)).expect_err("fractional");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn unparsable_text_is_a_parse_error() {
        assert_eq!(coerce::<i32>(Value::from("abc")).expect_err("int").kind, ErrorKind::Parse);
        assert_eq!(coerce::<f64>(Value::from("abc")).expect_err("float").kind, ErrorKind::Parse);
        assert_eq!(coerce::<bool>(Value::from("yes")).expect_err("bool").kind, ErrorKind::Parse);
        assert_eq!(coerce::<char>(Value::from("ab")).expect_err("char").kind, ErrorKind::Parse);
    }

    #[test]
    fn booleans_accept_text_and_bits() {
        assert!(coerce::<bool>(Value::from("TRUE")).expect("text"));
        assert!(!coerce::<bool>(Value::from(" false ")).expect("padded"));
        assert!(coerce::<bool>(Value::from(1)).expect("bit"));
        assert_eq!(coerce::<bool>(Value::from(2)).expect_err("two").kind, ErrorKind::Parse);
    }

    #[test]
    fn mismatched_variants_are_rejected() {
        let err = coerce::<i32>(Value::from(true)).expect_err("bool as int");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        let err = coerce::<Vec<u8>>(Value::from(1)).expect_err("int as bytes");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn identity_keeps_the_raw_value() {
        let coercion = Coercion::for_type(&TypeKey::of::<Value<'static>>()).expect("identity");
        assert_eq!(coercion, Coercion::Identity);

        let text = String::from("borrowed");
        let out = coercion.apply(&Value::from(text.as_str())).expect("apply");
        assert_eq!(*out.downcast::<Value<'static>>().expect("value"), Value::from("borrowed"));
    }

    #[test]
    fn unsupported_types_have_no_coercion() {
        assert_eq!(Coercion::for_type(&TypeKey::of::<std::time::Duration>()), None);
        assert_eq!(
            Coercion::for_type(&TypeKey::of::<u16>()),
            Some(Coercion::Builtin(Primitive::U16))
        );
    }
}
