//! Saga-scoped key/value store shared by the steps of one execution.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, SagaError};

/// Mutable data threaded through every action and compensation of one saga run.
///
/// A fresh context is created per execution and is exclusively owned by it.
/// The orchestrator hands out `&mut SagaContext` to one step at a time, so
/// no locking is involved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SagaContext {
    data: HashMap<String, Value>,
}

impl SagaContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context pre-populated with a copy of `data`.
    pub fn from_map(data: &HashMap<String, Value>) -> Self {
        Self { data: data.clone() }
    }

    /// Key under which data returned by `step` is stored.
    pub fn step_key(step: &str, key: &str) -> String {
        format!("{step}.{key}")
    }

    /// Stores a value, replacing any previous one under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Stores any serializable value.
    pub fn insert_serialized<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.data.insert(key.into(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Reads a value as `T`.
    ///
    /// Returns `Ok(None)` if the key is missing and an error if the stored
    /// value does not have the requested shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|source| SagaError::ContextType {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    /// Returns the stored value, or `default` if the key is missing.
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.data
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only view of the current contents.
    pub fn as_map(&self) -> &HashMap<String, Value> {
        &self.data
    }

    /// Merges the data a step returned, namespacing each key under the step name.
    pub(crate) fn merge_step_data(&mut self, step: &str, data: &HashMap<String, Value>) {
        for (key, value) in data {
            self.data
                .insert(Self::step_key(step, key), value.clone());
        }
    }
}
