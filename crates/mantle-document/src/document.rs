use std::collections::HashMap;
use std::fmt;

use crate::array::Array;
use crate::error::DocumentError;
use crate::value::Value;

/// An ordered mapping from unique string keys to values.
///
/// Iteration follows insertion order. `set` on an existing key replaces the
/// value in place; `set` on a new key appends. Equality ignores key order:
/// two documents are equal when they hold the same keys with equal values.
#[derive(Clone, Default)]
pub struct Document {
    fields: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Builds a document from key/value pairs, rejecting repeated keys.
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self, DocumentError>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut doc = Document::new();
        for (key, value) in pairs {
            doc.try_insert(key, value)?;
        }
        Ok(doc)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.fields[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.fields[i].1),
            None => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(Value::as_document)
    }

    pub fn get_array(&self, key: &str) -> Option<&Array> {
        self.get(key).and_then(Value::as_array)
    }

    /// Sets `key`, returning the previous value if there was one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&i) => Some(std::mem::replace(&mut self.fields[i].1, value)),
            None => {
                self.index.insert(key.clone(), self.fields.len());
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Appends `key`, failing if it is already present.
    pub fn try_insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), DocumentError> {
        let key = key.into();
        if self.index.contains_key(&key) {
            return Err(DocumentError::DuplicateKey(key));
        }
        self.index.insert(key.clone(), self.fields.len());
        self.fields.push((key, value.into()));
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.index.remove(key)?;
        let (_, value) = self.fields.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(value)
    }

    /// First key in insertion order. For request documents this is the
    /// command name.
    pub fn first_key(&self) -> Option<&str> {
        self.fields.first().map(|(k, _)| k.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolves a dotted path such as `address.city` or `tags.0`.
    ///
    /// Numeric segments index into arrays. Returns `None` as soon as a segment
    /// does not resolve.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.get(segment)?,
                Value::Array(arr) => {
                    let idx: usize = segment.parse().ok()?;
                    arr.get(idx).ok()?
                }
                _ => return None,
            };
        }
        Some(current)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| ov == v))
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a str, &'a Value);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a Value)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Builds a [`Document`] from `key => value` pairs.
///
/// Later entries overwrite earlier ones with the same key; use
/// [`Document::from_pairs`] when duplicates must be rejected.
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut doc = $crate::Document::new();
        $( doc.set($key, $value); )+
        doc
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array;

    #[test]
    fn from_pairs_rejects_duplicates() {
        let err = Document::from_pairs([("a", 1), ("b", 2), ("a", 3)]).unwrap_err();
        assert_eq!(err, DocumentError::DuplicateKey("a".into()));
    }

    #[test]
    fn set_existing_key_keeps_position() {
        let mut doc = doc! { "a" => 1, "b" => 2, "c" => 3 };
        let old = doc.set("b", "two");
        assert_eq!(old, Some(Value::Int32(2)));
        assert_eq!(doc.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(doc.get("b"), Some(&Value::from("two")));
    }

    #[test]
    fn set_new_key_appends() {
        let mut doc = doc! { "z" => 1 };
        doc.set("a", 2);
        assert_eq!(doc.keys().collect::<Vec<_>>(), ["z", "a"]);
    }

    #[test]
    fn remove_preserves_order_of_remaining_keys() {
        let mut doc = doc! { "a" => 1, "b" => 2, "c" => 3, "d" => 4 };
        assert_eq!(doc.remove("b"), Some(Value::Int32(2)));
        assert_eq!(doc.keys().collect::<Vec<_>>(), ["a", "c", "d"]);
        assert_eq!(doc.get("d"), Some(&Value::Int32(4)));
        assert_eq!(doc.remove("missing"), None);
        doc.set("b", 5);
        assert_eq!(doc.keys().collect::<Vec<_>>(), ["a", "c", "d", "b"]);
    }

    #[test]
    fn equality_ignores_order_but_not_types() {
        let a = doc! { "x" => 1, "y" => "s" };
        let b = doc! { "y" => "s", "x" => 1 };
        assert_eq!(a, b);

        let c = doc! { "x" => 1_i64, "y" => "s" };
        assert_ne!(a, c);
    }

    #[test]
    fn first_key_is_command_name() {
        let doc = doc! { "find" => "actor", "$db" => "monila" };
        assert_eq!(doc.first_key(), Some("find"));
        assert_eq!(Document::new().first_key(), None);
    }

    #[test]
    fn dotted_paths_resolve_through_documents_and_arrays() {
        let doc = doc! {
            "address" => doc! { "city" => "Austin" },
            "tags" => array!["a", "b"],
        };
        assert_eq!(doc.get_path("address.city"), Some(&Value::from("Austin")));
        assert_eq!(doc.get_path("tags.1"), Some(&Value::from("b")));
        assert_eq!(doc.get_path("tags.2"), None);
        assert_eq!(doc.get_path("address.zip"), None);
        assert_eq!(doc.get_path("address.city.x"), None);
    }
}
