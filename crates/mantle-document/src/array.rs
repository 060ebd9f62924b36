use crate::error::DocumentError;
use crate::value::Value;

/// An ordered, zero-indexed sequence of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array {
    items: Vec<Value>,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Value, DocumentError> {
        self.items.get(index).ok_or(DocumentError::IndexOutOfRange {
            index,
            len: self.items.len(),
        })
    }

    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<(), DocumentError> {
        let len = self.items.len();
        match self.items.get_mut(index) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(DocumentError::IndexOutOfRange { index, len }),
        }
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }

    /// Appends every element of `other`.
    pub fn append(&mut self, other: Array) {
        self.items.extend(other.items);
    }

    /// Copies the half-open range `start..end` into a new array.
    pub fn subslice(&self, start: usize, end: usize) -> Result<Array, DocumentError> {
        let len = self.items.len();
        if start > end {
            return Err(DocumentError::IndexOutOfRange { index: start, len });
        }
        if end > len {
            return Err(DocumentError::IndexOutOfRange { index: end, len });
        }
        Ok(Array {
            items: self.items[start..end].to_vec(),
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.items
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self { items }
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Array {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Builds an [`Array`] from a list of values.
#[macro_export]
macro_rules! array {
    () => { $crate::Array::new() };
    ($($value:expr),+ $(,)?) => {{
        let mut arr = $crate::Array::new();
        $( arr.push($value); )+
        arr
    }};
}
