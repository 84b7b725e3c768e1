/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/store.rs
*
* This file defines the central store the deploy core reads and writes
* `App` and `Framework` resources through.
*
* Architecture:
* - `AppStore` is the seam. Every call classifies its failure as
*   `Error::NotFound`, `Error::Conflict` or another error; the reconciliation
*   loop depends on exactly that classification.
* - `KubeStore` is the production implementation on top of `kube::Api`. The
*   API server provides optimistic concurrency: an update carries the
*   `resourceVersion` that was read, and a stale one is rejected with 409.
*   A create that loses the race against a concurrent create is also a 409,
*   so the retry loop re-reads and continues on the update path.
* - `MemoryStore` implements the same compare-and-swap contract in process.
*   It backs the tests and can inject write conflicts.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use kube::{
    api::{Api, PostParams},
    Client, ResourceExt,
};
use tracing::debug;

use crate::crds::{App, Framework};
use crate::error::{Error, Result};

#[async_trait]
pub trait AppStore: Send + Sync {
    async fn get_app(&self, name: &str) -> Result<App>;

    async fn create_app(&self, app: &App) -> Result<App>;

    /// Replaces the stored App. Fails with `Error::Conflict` when `app`
    /// carries a stale `resourceVersion`.
    async fn update_app(&self, app: &App) -> Result<App>;

    async fn get_framework(&self, name: &str) -> Result<Framework>;
}

/// Maps API server status codes onto the store's error classification.
fn classify(kind: &str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(e) if e.code == 404 => Error::NotFound(format!("{} '{}'", kind, name)),
        kube::Error::Api(e) if e.code == 409 => Error::Conflict(format!("{} '{}': {}", kind, name, e.message)),
        e => Error::Kube(e),
    }
}

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn apps(&self) -> Api<App> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl AppStore for KubeStore {
    async fn get_app(&self, name: &str) -> Result<App> {
        self.apps().get(name).await.map_err(|e| classify("app", name, e))
    }

    async fn create_app(&self, app: &App) -> Result<App> {
        let name = app.name_any();
        debug!(app = %name, "Creating app");
        self.apps()
            .create(&PostParams::default(), app)
            .await
            .map_err(|e| classify("app", &name, e))
    }

    async fn update_app(&self, app: &App) -> Result<App> {
        let name = app.name_any();
        debug!(app = %name, resource_version = ?app.resource_version(), "Updating app");
        self.apps()
            .replace(&name, &PostParams::default(), app)
            .await
            .map_err(|e| classify("app", &name, e))
    }

    async fn get_framework(&self, name: &str) -> Result<Framework> {
        let frameworks: Api<Framework> = Api::all(self.client.clone());
        frameworks.get(name).await.map_err(|e| classify("framework", name, e))
    }
}

/// In-process store with `resourceVersion` compare-and-swap semantics.
#[derive(Default)]
pub struct MemoryStore {
    apps: Mutex<HashMap<String, App>>,
    frameworks: Mutex<HashMap<String, Framework>>,
    next_version: AtomicU32,
    pending_conflicts: AtomicU32,
    gets: AtomicU32,
    creates: AtomicU32,
    updates: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_framework(self, framework: Framework) -> Self {
        self.insert_framework(framework);
        self
    }

    pub fn insert_framework(&self, framework: Framework) {
        let mut frameworks = self.frameworks.lock().unwrap_or_else(|e| e.into_inner());
        frameworks.insert(framework.name_any(), framework);
    }

    /// Stores `app` as-is, assigning a fresh resource version.
    pub fn insert_app(&self, mut app: App) -> App {
        app.metadata.resource_version = Some(self.bump());
        let mut apps = self.apps.lock().unwrap_or_else(|e| e.into_inner());
        apps.insert(app.name_any(), app.clone());
        app
    }

    pub fn app(&self, name: &str) -> Option<App> {
        let apps = self.apps.lock().unwrap_or_else(|e| e.into_inner());
        apps.get(name).cloned()
    }

    /// Makes the next `count` updates fail with a conflict, as if another
    /// writer got in first.
    pub fn inject_update_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn get_count(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> u32 {
        self.updates.load(Ordering::SeqCst)
    }

    fn bump(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn take_injected_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AppStore for MemoryStore {
    async fn get_app(&self, name: &str) -> Result<App> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.app(name)
            .ok_or_else(|| Error::NotFound(format!("app '{}'", name)))
    }

    async fn create_app(&self, app: &App) -> Result<App> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let name = app.name_any();
        let mut apps = self.apps.lock().unwrap_or_else(|e| e.into_inner());
        if apps.contains_key(&name) {
            return Err(Error::Conflict(format!("app '{}': already exists", name)));
        }
        let mut created = app.clone();
        created.metadata.resource_version = Some(self.bump());
        apps.insert(name, created.clone());
        Ok(created)
    }

    async fn update_app(&self, app: &App) -> Result<App> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let name = app.name_any();
        if self.take_injected_conflict() {
            return Err(Error::Conflict(format!("app '{}': injected", name)));
        }

        let mut apps = self.apps.lock().unwrap_or_else(|e| e.into_inner());
        let stored = apps
            .get(&name)
            .ok_or_else(|| Error::NotFound(format!("app '{}'", name)))?;
        if stored.metadata.resource_version != app.metadata.resource_version {
            return Err(Error::Conflict(format!(
                "app '{}': resource version {:?} is stale",
                name, app.metadata.resource_version
            )));
        }

        let mut updated = app.clone();
        updated.metadata.resource_version = Some(self.bump());
        apps.insert(name, updated.clone());
        Ok(updated)
    }

    async fn get_framework(&self, name: &str) -> Result<Framework> {
        let frameworks = self.frameworks.lock().unwrap_or_else(|e| e.into_inner());
        frameworks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("framework '{}'", name)))
    }
}
