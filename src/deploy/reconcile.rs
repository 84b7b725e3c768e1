/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/deploy/reconcile.rs
*
* This file implements the read-modify-write cycle that merges a deploy
* request into the stored App.
*
* Architecture:
* 1.  **Fetch**: The App is read by name. A missing App is only created after
*     `validate_create_app` agrees; the attempt then ends in a create.
* 2.  **Mutate**: Field mutations run in a fixed order: builder and build
*     packs (source deploys only), request validation, framework,
*     description, environment, registry secret and finally the deployment
*     slot. Each mutation goes through `assign`, so a field the user did not
*     supply is skipped and any other error aborts the attempt before
*     anything is written.
* 3.  **Write**: A created App is always written; an existing App only when a
*     mutation changed it. The write carries the `resourceVersion` of the
*     read, and a conflict restarts the whole cycle from the fetch through
*     `retry_on_conflict`.
*
* `plan_app` runs steps 1 and 2 without a deployment and without writing, so
* the runner can learn the effective framework, builder and pull secret
* before it calls out to the builder and the registry.
*
* SPDX-License-Identifier: Apache-2.0
*/

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, Instrument};

use crate::builder::resolve_builder;
use crate::config::Config;
use crate::crds::{App, AppSpec, IngressSpec};
use crate::deploy::change_set::{ChangeSet, ChangeSetError};
use crate::deploy::update::{apply_deployment, DeploymentRequest};
use crate::deploy::validate::{validate_create_app, validate_deploy, validate_source_deploy};
use crate::error::{Error, Result};
use crate::retry::{retry_on_conflict, RetryConfig};
use crate::store::AppStore;

/// Guarded assignment: runs `apply` with the getter's value, skips it when
/// the field was not supplied and fails on any other getter error. Returns
/// whether `apply` changed the App.
pub fn assign<T>(value: std::result::Result<T, ChangeSetError>, apply: impl FnOnce(T) -> Result<bool>) -> Result<bool> {
    match value {
        Ok(v) => apply(v),
        Err(ChangeSetError::Missing(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn set_if_changed<T: PartialEq>(field: &mut T, value: T) -> bool {
    if *field == value {
        return false;
    }
    *field = value;
    true
}

/// A freshly synthesised App: no deployments and the default domain enabled.
fn new_app(name: &str) -> App {
    App::new(
        name,
        AppSpec {
            deployments: Vec::new(),
            ingress: IngressSpec {
                generate_default_cname: true,
                ..Default::default()
            },
            ..Default::default()
        },
    )
}

/// Applies the change set (and the deployment, when given) to `app`.
pub fn mutate_app(
    app: &mut App,
    change_set: &ChangeSet,
    config: &Config,
    deployment: Option<&DeploymentRequest>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let mut changed = false;

    if change_set.is_source_deploy() {
        validate_source_deploy(change_set)?;
        let builder = resolve_builder(
            change_set.get_builder().ok(),
            app.spec.builder.as_deref(),
            config.default_builder.as_deref(),
        );
        changed |= set_if_changed(&mut app.spec.builder, Some(builder));
        changed |= assign(change_set.get_build_packs(), |packs| {
            Ok(set_if_changed(&mut app.spec.build_packs, packs.to_vec()))
        })?;
    }

    validate_deploy(change_set, app)?;

    changed |= assign(change_set.get_framework_name(), |framework| {
        if let Some(current) = app.spec.framework.as_deref() {
            if current != framework {
                return Err(Error::FrameworkChange);
            }
            return Ok(false);
        }
        app.spec.framework = Some(framework.to_string());
        Ok(true)
    })?;

    changed |= assign(change_set.get_description(), |description| {
        Ok(set_if_changed(&mut app.spec.description, Some(description.to_string())))
    })?;

    changed |= assign(change_set.get_environments(), |env| {
        Ok(set_if_changed(&mut app.spec.env, env))
    })?;

    changed |= assign(change_set.get_docker_registry_secret(), |secret| {
        Ok(set_if_changed(
            &mut app.spec.docker_registry.secret_name,
            Some(secret.to_string()),
        ))
    })?;

    if let Some(request) = deployment {
        let before = app.spec.clone();
        apply_deployment(app, request, now)?;
        changed |= app.spec != before;
    }

    Ok(changed)
}

/// The App as it would look after the change set is applied, without a
/// deployment and without writing anything.
pub async fn plan_app(store: &dyn AppStore, change_set: &ChangeSet, config: &Config, now: DateTime<Utc>) -> Result<App> {
    let (mut app, _) = fetch_or_new(store, change_set).await?;
    mutate_app(&mut app, change_set, config, None, now)?;
    Ok(app)
}

async fn fetch_or_new(store: &dyn AppStore, change_set: &ChangeSet) -> Result<(App, bool)> {
    match store.get_app(&change_set.app_name).await {
        Ok(app) => Ok((app, true)),
        Err(e) if e.is_not_found() => {
            validate_create_app(store, change_set).await?;
            Ok((new_app(&change_set.app_name), false))
        }
        Err(e) => Err(Error::AppLookup {
            name: change_set.app_name.clone(),
            source: Box::new(e),
        }),
    }
}

async fn reconcile_attempt(
    store: &dyn AppStore,
    change_set: &ChangeSet,
    config: &Config,
    deployment: Option<&DeploymentRequest>,
    now: DateTime<Utc>,
) -> Result<App> {
    let (mut app, exists) = fetch_or_new(store, change_set).await?;
    let changed = mutate_app(&mut app, change_set, config, deployment, now)?;

    if !exists {
        info!(app = %change_set.app_name, "Creating app");
        return store.create_app(&app).await;
    }
    if !changed {
        debug!(app = %change_set.app_name, "App unchanged, skipping write");
        return Ok(app);
    }
    info!(
        app = %change_set.app_name,
        deployments_count = app.spec.deployments_count,
        "Updating app"
    );
    store.update_app(&app).await
}

/// Runs the fetch, mutate, write cycle until it lands without a conflict.
pub async fn reconcile_app(
    store: &dyn AppStore,
    change_set: &ChangeSet,
    config: &Config,
    deployment: Option<&DeploymentRequest>,
    retry: &RetryConfig,
    now: DateTime<Utc>,
) -> Result<App> {
    let span = info_span!("reconcile", app = %change_set.app_name);
    retry_on_conflict(retry, "reconcile app", || {
        reconcile_attempt(store, change_set, config, deployment, now)
    })
    .instrument(span)
    .await
}
