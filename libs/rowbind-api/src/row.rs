use std::borrow::Cow;

use crate::value::Value;

/// One tabular record: ordered `column name → value` pairs.
///
/// Column names are case-sensitive. The row source (DB driver, CSV parser,
/// JSON decoder) owns producing this shape; the engine only reads it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row<'a> {
    columns: Vec<(Cow<'a, str>, Value<'a>)>,
}

impl<'a> Row<'a> {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
        }
    }

    /// Append a column. An existing column of the same name keeps its
    /// position and gets the new value.
    pub fn push(&mut self, name: impl Into<Cow<'a, str>>, value: impl Into<Value<'a>>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.columns.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            self.columns.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value<'a>> {
        self.columns
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value<'a>)> {
        self.columns.iter().map(|(k, v)| (k.as_ref(), v))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(k, _)| k.as_ref())
    }

    /// Build a row from a JSON object, borrowing its strings.
    pub fn from_json(object: &'a serde_json::Map<String, serde_json::Value>) -> Self {
        object
            .iter()
            .map(|(k, v)| (Cow::Borrowed(k.as_str()), Value::from(v)))
            .collect()
    }

    pub fn into_owned(self) -> Row<'static> {
        Row {
            columns: self
                .columns
                .into_iter()
                .map(|(k, v)| (Cow::Owned(k.into_owned()), v.into_owned()))
                .collect(),
        }
    }
}

impl<'a, K, V> FromIterator<(K, V)> for Row<'a>
where
    K: Into<Cow<'a, str>>,
    V: Into<Value<'a>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.push(name, value);
        }
        row
    }
}

impl<'a, K, V, const N: usize> From<[(K, V); N]> for Row<'a>
where
    K: Into<Cow<'a, str>>,
    V: Into<Value<'a>>,
{
    fn from(columns: [(K, V); N]) -> Self {
        columns.into_iter().collect()
    }
}
