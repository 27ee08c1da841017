// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-instance key/value store for passing startup-time data to test code.
//!
//! A [`Context`] is created for each database instance and handed to the
//! on-ready hook, which can stash anything the tests will need later (a
//! generated identifier, a parsed timestamp, a pre-built client).  The
//! context lives exactly as long as the instance; there is no ambient or
//! global lookup.

use std::any::Any;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("no value for key {key:?} in the instance context")]
    Missing { key: String },

    #[error("value for key {key:?} in the instance context is not a {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// Maps string keys to arbitrary caller-supplied values.
#[derive(Default)]
pub struct Context {
    values: BTreeMap<String, Box<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Looks up `key`, failing loudly if it is absent or holds a value of a
    /// different type.
    pub fn get<T: Any>(&self, key: &str) -> Result<&T, ContextError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ContextError::Missing { key: key.to_string() })?;
        value.downcast_ref::<T>().ok_or_else(|| ContextError::WrongType {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Looks up `key`, returning `None` if it is absent or holds a value of
    /// a different type.
    pub fn get_opt<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    /// Looks up `key`, returning `default` if it is absent or holds a value
    /// of a different type.
    pub fn get_or<'a, T: Any>(&'a self, key: &str, default: &'a T) -> &'a T {
        self.get_opt(key).unwrap_or(default)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}
