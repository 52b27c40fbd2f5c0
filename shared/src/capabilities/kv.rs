use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Display;
use std::marker::PhantomData;
use thiserror::Error;

use crate::{AppError, ErrorKind};

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    /// Remembered search inputs for one query screen of one app.
    pub fn sticky(app_id: &str, query_key: &str) -> Result<Self, KvError> {
        Self::new(KeyNamespace::Sticky, format!("{app_id}:{query_key}"))
    }

    #[must_use]
    pub fn raw(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.key)
    }

    #[must_use]
    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        if key.trim().is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(KvError::InvalidKey {
                key: key.chars().take(50).collect::<String>() + "...",
                reason: format!("key exceeds maximum length of {MAX_KEY_LENGTH} bytes"),
            });
        }

        if key.chars().any(|c| c.is_control()) {
            return Err(KvError::InvalidKey {
                key: key.escape_default().to_string(),
                reason: "key contains control characters".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    Sticky,
    Settings,
}

impl KeyNamespace {
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            KeyNamespace::Sticky => "sticky",
            KeyNamespace::Settings => "settings",
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("serialization error: {message}")]
    Serialization { message: String, key: Option<String> },

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        let kind = match e {
            KvError::Serialization { .. } => ErrorKind::Serialization,
            KvError::InvalidKey { .. } | KvError::ValueTooLarge { .. } => ErrorKind::Validation,
            KvError::Storage { .. } => ErrorKind::Storage,
        };
        AppError::new(kind, e.to_string())
    }
}

/// Flattens whatever the key-value shell returned into something an event
/// can carry.
pub fn read_result<E: Display>(result: Result<Option<Vec<u8>>, E>) -> Result<Option<Vec<u8>>, KvError> {
    result.map_err(|e| KvError::Storage {
        message: e.to_string(),
    })
}

/// JSON codec for one kind of stored value.
pub struct TypedKvStore<T> {
    namespace: KeyNamespace,
    _phantom: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> TypedKvStore<T> {
    #[must_use]
    pub const fn new(namespace: KeyNamespace) -> Self {
        Self {
            namespace,
            _phantom: PhantomData,
        }
    }

    pub fn key(&self, key: impl Into<String>) -> Result<KvKey, KvError> {
        KvKey::new(self.namespace.clone(), key)
    }

    pub fn encode(&self, value: &T) -> Result<Vec<u8>, KvError> {
        let data = serde_json::to_vec(value).map_err(|e| KvError::Serialization {
            message: e.to_string(),
            key: None,
        })?;
        if data.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: data.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        Ok(data)
    }

    pub fn decode(&self, data: Option<&[u8]>) -> Result<Option<T>, KvError> {
        match data {
            None | Some([]) => Ok(None),
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| KvError::Serialization {
                    message: e.to_string(),
                    key: None,
                }),
        }
    }
}

pub const CASES_PER_PAGE_KEY: &str = "cases_per_page";

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_sticky_key_layout() {
        let key = KvKey::sticky("app-1", "search_command.m2").unwrap();
        assert_eq!(key.raw(), "sticky:app-1:search_command.m2");
        assert_eq!(key.namespace(), &KeyNamespace::Sticky);
    }

    #[test]
    fn test_key_validation() {
        assert!(KvKey::new(KeyNamespace::Settings, "").is_err());
        assert!(KvKey::new(KeyNamespace::Settings, "  ").is_err());
        assert!(KvKey::new(KeyNamespace::Settings, "a\0b").is_err());
        assert!(KvKey::new(KeyNamespace::Settings, "x".repeat(MAX_KEY_LENGTH + 1)).is_err());
        assert!(KvKey::new(KeyNamespace::Settings, CASES_PER_PAGE_KEY).is_ok());
    }

    #[test]
    fn test_typed_store_codec() {
        let store: TypedKvStore<BTreeMap<String, String>> = TypedKvStore::new(KeyNamespace::Sticky);
        let values = BTreeMap::from([("name".to_string(), "#,#ann".to_string())]);
        let bytes = store.encode(&values).unwrap();
        assert_eq!(store.decode(Some(&bytes)).unwrap(), Some(values));
        assert_eq!(store.decode(None).unwrap(), None);
        assert_eq!(store.decode(Some(&[])).unwrap(), None);
        assert!(matches!(
            store.decode(Some(b"not json")),
            Err(KvError::Serialization { .. })
        ));
    }

    #[test]
    fn test_read_result_maps_shell_errors() {
        let ok: Result<Option<Vec<u8>>, String> = Ok(Some(vec![1]));
        assert_eq!(read_result(ok), Ok(Some(vec![1])));
        let err: Result<Option<Vec<u8>>, String> = Err("disk full".into());
        assert_eq!(
            read_result(err),
            Err(KvError::Storage {
                message: "disk full".into()
            })
        );
    }
}
