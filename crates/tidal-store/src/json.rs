//! JSON-typed access on top of a [`StateStore`].

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::StateStore;

fn to_json<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| Error::Serialization {
        key: key.to_string(),
        source,
    })
}

fn from_json<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| Error::Serialization {
        key: key.to_string(),
        source,
    })
}

/// Read and decode the JSON document under `key`.
pub async fn get_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(from_json(key, &bytes)?)),
        None => Ok(None),
    }
}

/// Encode `value` as JSON and store it under `key`, replacing any previous value.
pub async fn set_json<T: Serialize + ?Sized + Sync>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = to_json(key, value)?;
    store.set(key, bytes).await
}

/// Append `value` to the JSON array stored under `key`.
///
/// A missing key starts a new array. The read-modify-write runs as one
/// atomic update, so concurrent appends never lose entries.
pub async fn append_json<T>(store: &dyn StateStore, key: &str, value: T) -> Result<()>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    let owned_key = key.to_string();
    store
        .update(
            key,
            Box::new(move |current| {
                let mut items: Vec<T> = match current {
                    Some(bytes) => from_json(&owned_key, &bytes)?,
                    None => Vec::new(),
                };
                items.push(value);
                to_json(&owned_key, &items)
            }),
        )
        .await
}
