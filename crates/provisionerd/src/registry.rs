// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of locally available provisioners.

use std::collections::HashMap;
use std::sync::Arc;

use gantry_sdk::Provisioner;

/// Static mapping from provisioner kind to its RPC client.
///
/// Jobs arriving with a kind that is not registered here are cancelled
/// immediately.
#[derive(Clone, Default)]
pub struct Provisioners(HashMap<String, Arc<dyn Provisioner>>);

impl Provisioners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: impl Into<String>, provisioner: Arc<dyn Provisioner>) {
        self.0.insert(kind.into(), provisioner);
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Provisioner>> {
        self.0.get(kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Arc<dyn Provisioner>)> for Provisioners {
    fn from_iter<I: IntoIterator<Item = (String, Arc<dyn Provisioner>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Debug for Provisioners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
