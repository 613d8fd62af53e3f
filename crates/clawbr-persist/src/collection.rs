//! Typed, prefix-scoped collections with guarded updates
//!
//! [`Collection::update`] is the only way entities change after insert. It
//! reads the current version, runs the transition on a copy and writes back
//! conditionally on that version; on a conflict it re-reads and re-runs the
//! transition against the newer state.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{StorageBackend, StorageError};

/// Attempts before a contended update gives up
const MAX_ATTEMPTS: usize = 32;

/// What a transition decided to do with the entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<R> {
    /// Persist the modified entity and return `R`
    Write(R),
    /// Leave the stored entity untouched and return `R`
    Keep(R),
}

/// Entities of one type stored under a common key prefix
#[derive(Debug)]
pub struct Collection<T> {
    backend: Arc<dyn StorageBackend>,
    prefix: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            prefix: self.prefix,
            _marker: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub fn new(backend: Arc<dyn StorageBackend>, prefix: &'static str) -> Self {
        Self {
            backend,
            prefix,
            _marker: PhantomData,
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Get an entity and its version
    pub async fn get_versioned(&self, id: &str) -> Result<Option<(u64, T)>, StorageError> {
        match self.backend.get_value(&self.key(id)).await? {
            Some(stored) => Ok(Some((stored.version, serde_json::from_value(stored.value)?))),
            None => Ok(None),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>, StorageError> {
        Ok(self.get_versioned(id).await?.map(|(_, value)| value))
    }

    /// Insert a new entity; fails with `AlreadyExists` if the id is taken
    pub async fn insert(&self, id: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_value(value)?;
        self.backend.put_value(&self.key(id), None, json).await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.backend.delete(&self.key(id)).await
    }

    /// All entities whose id starts with `sub_prefix`, in key order
    pub async fn list(&self, sub_prefix: &str) -> Result<Vec<T>, StorageError> {
        let keys = self.backend.list_keys(&self.key(sub_prefix)).await?;
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            // A key listed but gone by now was deleted concurrently
            if let Some(stored) = self.backend.get_value(&key).await? {
                items.push(serde_json::from_value(stored.value)?);
            }
        }
        Ok(items)
    }

    pub async fn count(&self, sub_prefix: &str) -> Result<usize, StorageError> {
        self.backend.count_keys(&self.key(sub_prefix)).await
    }

    /// Delete the entity if `check` accepts its current state. The delete
    /// is conditional on the version `check` saw.
    pub async fn remove_if<E, F>(&self, id: &str, mut check: F) -> Result<T, E>
    where
        F: FnMut(&T) -> Result<(), E> + Send,
        E: From<StorageError>,
    {
        let key = self.key(id);
        for attempt in 0..MAX_ATTEMPTS {
            let (version, value) = self
                .get_versioned(id)
                .await?
                .ok_or_else(|| StorageError::NotFound(key.clone()))?;
            check(&value)?;
            if self.backend.delete_versioned(&key, version).await? {
                return Ok(value);
            }
            metrics::counter!("clawbr_cas_retries_total", "collection" => self.prefix).increment(1);
            debug!(key = %key, attempt, "Concurrent update before delete, retrying");
        }
        Err(StorageError::Contention(key).into())
    }

    /// Run `transition` against the stored entity until it applies cleanly.
    ///
    /// Missing entities yield `StorageError::NotFound` through `E`.
    pub async fn update<R, E, F>(&self, id: &str, transition: F) -> Result<R, E>
    where
        F: FnMut(&mut T) -> Result<Change<R>, E> + Send,
        E: From<StorageError>,
        R: Send,
    {
        self.cas_loop(id, None::<fn() -> T>, transition).await
    }

    /// Like [`update`](Self::update), starting from `default()` when the
    /// entity does not exist yet
    pub async fn upsert<R, E, D, F>(&self, id: &str, default: D, transition: F) -> Result<R, E>
    where
        D: Fn() -> T + Send,
        F: FnMut(&mut T) -> Result<Change<R>, E> + Send,
        E: From<StorageError>,
        R: Send,
    {
        self.cas_loop(id, Some(default), transition).await
    }

    async fn cas_loop<R, E, D, F>(&self, id: &str, default: Option<D>, mut transition: F) -> Result<R, E>
    where
        D: Fn() -> T + Send,
        F: FnMut(&mut T) -> Result<Change<R>, E> + Send,
        E: From<StorageError>,
        R: Send,
    {
        let key = self.key(id);
        for attempt in 0..MAX_ATTEMPTS {
            let (expected, mut value) = match self.get_versioned(id).await? {
                Some((version, value)) => (Some(version), value),
                None => match &default {
                    Some(make) => (None, make()),
                    None => return Err(StorageError::NotFound(key).into()),
                },
            };

            let result = match transition(&mut value)? {
                Change::Keep(result) => return Ok(result),
                Change::Write(result) => result,
            };

            let json = serde_json::to_value(&value).map_err(StorageError::from)?;
            match self.backend.put_value(&key, expected, json).await {
                Ok(_) => return Ok(result),
                Err(StorageError::VersionConflict { .. }) | Err(StorageError::AlreadyExists(_)) => {
                    metrics::counter!("clawbr_cas_retries_total", "collection" => self.prefix)
                        .increment(1);
                    debug!(key = %key, attempt, "Concurrent update, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::Contention(key).into())
    }
}
