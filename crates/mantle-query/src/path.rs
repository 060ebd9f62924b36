use mantle_document::{Document, Value};

/// Every value reachable at a dotted path.
///
/// Numeric segments index into arrays. Any other segment applied to an
/// array fans out over its document elements, so `items.sku` on
/// `{items: [{sku: 1}, {sku: 2}]}` yields both `1` and `2`. An empty result
/// means the path is absent.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect_in_document(doc, &segments, &mut out);
    out
}

fn collect_in_document<'a>(doc: &'a Document, segments: &[&str], out: &mut Vec<&'a Value>) {
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = doc.get(head) {
            collect(value, rest, out);
        }
    }
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Value::Document(doc) => collect_in_document(doc, segments, out),
        Value::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Ok(item) = items.get(index) {
                    collect(item, rest, out);
                }
            }
            Err(_) => {
                for item in items {
                    if let Value::Document(doc) = item {
                        collect_in_document(doc, segments, out);
                    }
                }
            }
        },
        _ => {}
    }
}
