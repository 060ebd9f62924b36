use mantle_document::{Array, Document, Value};

use crate::error::FilterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Include,
    Exclude,
}

/// An inclusion or exclusion projection over dotted paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    mode: Mode,
    paths: Vec<Vec<String>>,
}

impl Projection {
    /// The projection that returns documents unchanged.
    pub fn identity() -> Self {
        Self {
            mode: Mode::Exclude,
            paths: Vec::new(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.mode == Mode::Exclude && self.paths.is_empty()
    }

    /// Parse `{ field: 1|0|true|false, ... }`. `_id` is kept unless it is
    /// explicitly excluded, and may be excluded from an inclusion projection.
    pub fn parse(doc: &Document) -> Result<Self, FilterError> {
        let mut id = None;
        let mut included = Vec::new();
        let mut excluded = Vec::new();

        for (key, value) in doc {
            let keep = match value {
                Value::Bool(b) => *b,
                Value::Int32(_) | Value::Int64(_) | Value::Double(_) => {
                    value.as_f64().is_some_and(|n| n != 0.0)
                }
                _ => {
                    return Err(FilterError(format!(
                        "unsupported projection value for {key}"
                    )));
                }
            };
            let path: Vec<String> = key.split('.').map(str::to_string).collect();
            match (key, keep) {
                ("_id", keep) => id = Some(keep),
                (_, true) => included.push(path),
                (_, false) => excluded.push(path),
            }
        }

        if !included.is_empty() && !excluded.is_empty() {
            return Err(FilterError::new(
                "cannot mix inclusion and exclusion in a projection",
            ));
        }

        let projection = if !included.is_empty() || (id == Some(true) && excluded.is_empty()) {
            if id != Some(false) {
                included.push(vec!["_id".to_string()]);
            }
            Self {
                mode: Mode::Include,
                paths: included,
            }
        } else {
            if id == Some(false) {
                excluded.push(vec!["_id".to_string()]);
            }
            Self {
                mode: Mode::Exclude,
                paths: excluded,
            }
        };
        Ok(projection)
    }

    pub fn apply(&self, doc: &Document) -> Document {
        let paths: Vec<&[String]> = self.paths.iter().map(Vec::as_slice).collect();
        match self.mode {
            Mode::Include => include(doc, &paths),
            Mode::Exclude if paths.is_empty() => doc.clone(),
            Mode::Exclude => exclude(doc, &paths),
        }
    }
}

/// Paths below `key`, or `None` if none of `paths` start with it.
fn descend<'a>(key: &str, paths: &[&'a [String]]) -> Option<Vec<&'a [String]>> {
    let below: Vec<&[String]> = paths
        .iter()
        .filter(|p| p.first().is_some_and(|head| head == key))
        .map(|p| &p[1..])
        .collect();
    (!below.is_empty()).then_some(below)
}

fn include(doc: &Document, paths: &[&[String]]) -> Document {
    let mut out = Document::new();
    for (key, value) in doc {
        let Some(below) = descend(key, paths) else {
            continue;
        };
        if below.iter().any(|p| p.is_empty()) {
            out.set(key, value.clone());
            continue;
        }
        match value {
            Value::Document(sub) => {
                out.set(key, include(sub, &below));
            }
            Value::Array(items) => {
                let kept: Array = items
                    .iter()
                    .filter_map(Value::as_document)
                    .map(|sub| Value::Document(include(sub, &below)))
                    .collect();
                out.set(key, kept);
            }
            _ => {}
        }
    }
    out
}

fn exclude(doc: &Document, paths: &[&[String]]) -> Document {
    let mut out = Document::with_capacity(doc.len());
    for (key, value) in doc {
        let Some(below) = descend(key, paths) else {
            out.set(key, value.clone());
            continue;
        };
        if below.iter().any(|p| p.is_empty()) {
            continue;
        }
        let projected = match value {
            Value::Document(sub) => Value::Document(exclude(sub, &below)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Document(sub) => Value::Document(exclude(sub, &below)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            other => other.clone(),
        };
        out.set(key, projected);
    }
    out
}
