use serde::{Deserialize, Serialize};

/// How a Rust parameter name (`snake_case`) becomes a column name.
///
/// Explicit `#[row(rename = "...")]` aliases bypass the conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnNaming {
    /// `foo_id` → `foo_id`
    #[default]
    AsIs,
    /// `foo_id` → `fooId`
    CamelCase,
    /// `foo_id` → `FooId`
    PascalCase,
    /// `foo_id` → `FOO_ID`
    ScreamingSnakeCase,
    /// `foo_id` → `foo-id`
    KebabCase,
}

impl ColumnNaming {
    pub fn apply(&self, name: &str) -> String {
        match self {
            ColumnNaming::AsIs => name.to_string(),
            ColumnNaming::CamelCase => {
                let pascal = to_pascal(name);
                lower_first(&pascal)
            }
            ColumnNaming::PascalCase => to_pascal(name),
            ColumnNaming::ScreamingSnakeCase => name.to_ascii_uppercase(),
            ColumnNaming::KebabCase => name.replace('_', "-"),
        }
    }
}

/// Joins the column name of a flattened parameter with the column names
/// of the nested type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameJoiner {
    /// `baz_baz` + `foo_foo` → `baz_baz_foo_foo`
    #[default]
    Snake,
    /// `bazBaz` + `fooFoo` → `bazBazFooFoo`
    Camel,
    /// `baz-baz` + `foo-foo` → `baz-baz-foo-foo`
    Kebab,
}

impl NameJoiner {
    pub fn join(&self, prefix: &str, name: &str) -> String {
        match self {
            NameJoiner::Snake => format!("{prefix}_{name}"),
            NameJoiner::Kebab => format!("{prefix}-{name}"),
            NameJoiner::Camel => format!("{prefix}{}", upper_first(name)),
        }
    }
}

fn to_pascal(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(upper_first)
        .collect()
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_conversions() {
        assert_eq!(ColumnNaming::AsIs.apply("foo_id"), "foo_id");
        assert_eq!(ColumnNaming::CamelCase.apply("foo_id"), "fooId");
        assert_eq!(ColumnNaming::CamelCase.apply("baz_arg"), "bazArg");
        assert_eq!(ColumnNaming::CamelCase.apply("description"), "description");
        assert_eq!(ColumnNaming::PascalCase.apply("foo_id"), "FooId");
        assert_eq!(ColumnNaming::ScreamingSnakeCase.apply("foo_id"), "FOO_ID");
        assert_eq!(ColumnNaming::KebabCase.apply("foo_id"), "foo-id");
    }

    #[test]
    fn joiners() {
        assert_eq!(NameJoiner::Snake.join("baz_baz", "foo_foo"), "baz_baz_foo_foo");
        assert_eq!(NameJoiner::Camel.join("bazBaz", "fooFoo"), "bazBazFooFoo");
        assert_eq!(NameJoiner::Kebab.join("baz-baz", "foo-foo"), "baz-baz-foo-foo");
    }
}
