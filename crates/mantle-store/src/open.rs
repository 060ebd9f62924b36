use std::sync::Arc;

use url::Url;

use crate::error::StoreError;
use crate::memory::{DEFAULT_MAX_CONNS, MemoryStore};
use crate::storage::Storage;

/// Opens the backend named by a storage URL such as `memory://?max_conns=8`.
pub fn open(url: &str) -> Result<Arc<dyn Storage>, StoreError> {
    let parsed = Url::parse(url).map_err(|e| StoreError::UnsupportedUrl(format!("{url}: {e}")))?;

    match parsed.scheme() {
        "memory" => {
            let mut max_conns = DEFAULT_MAX_CONNS;
            for (key, value) in parsed.query_pairs() {
                match key.as_ref() {
                    "max_conns" => {
                        max_conns = value.parse().map_err(|_| {
                            StoreError::UnsupportedUrl(format!("invalid max_conns: {value}"))
                        })?;
                    }
                    other => {
                        return Err(StoreError::UnsupportedUrl(format!(
                            "unknown parameter: {other}"
                        )));
                    }
                }
            }
            Ok(Arc::new(MemoryStore::with_max_conns(max_conns)))
        }
        scheme => Err(StoreError::UnsupportedUrl(format!("unknown scheme: {scheme}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls() {
        assert!(open("memory://").is_ok());
        assert!(open("memory://?max_conns=4").is_ok());
        assert!(matches!(open("memory://?max_conns=x"), Err(StoreError::UnsupportedUrl(_))));
        assert!(matches!(open("memory://?pool=1"), Err(StoreError::UnsupportedUrl(_))));
    }

    #[test]
    fn unknown_scheme() {
        let err = open("postgres://127.0.0.1/ferretdb").err().unwrap();
        assert!(err.to_string().contains("unknown scheme: postgres"));
        assert!(open("not a url").is_err());
    }
}
