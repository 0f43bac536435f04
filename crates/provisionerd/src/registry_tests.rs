// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use async_trait::async_trait;
use gantry_sdk::{
    ParseRequest, ParseResponse, Provisioner, ProvisionRequest, ProvisionResponse, RpcError,
};
use tokio::sync::mpsc;

use super::Provisioners;

/// Provisioner whose streams end immediately.
struct NullProvisioner;

#[async_trait]
impl Provisioner for NullProvisioner {
    async fn parse(
        &self,
        _request: ParseRequest,
    ) -> Result<mpsc::Receiver<ParseResponse>, RpcError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn provision(
        &self,
        _request: ProvisionRequest,
    ) -> Result<mpsc::Receiver<ProvisionResponse>, RpcError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
}

#[test]
fn lookup_by_kind() {
    let mut provisioners = Provisioners::new();
    provisioners.insert("terraform", Arc::new(NullProvisioner));

    assert!(provisioners.get("terraform").is_some());
    assert!(provisioners.get("pulumi").is_none());
    assert_eq!(provisioners.len(), 1);
}

#[test]
fn empty_registry_has_no_kinds() {
    let provisioners = Provisioners::new();
    assert!(provisioners.is_empty());
    assert!(provisioners.get("terraform").is_none());
}

#[test]
fn debug_lists_registered_kinds() {
    let mut provisioners = Provisioners::new();
    provisioners.insert("terraform", Arc::new(NullProvisioner));

    let debug = format!("{:?}", provisioners);
    assert!(debug.contains("terraform"), "got: {debug}");
}
