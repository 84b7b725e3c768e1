/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/deploy/validate.rs
*
* Request-level checks run inside every reconcile attempt, before any App
* field is touched.
*
* SPDX-License-Identifier: Apache-2.0
*/

use tracing::debug;

use crate::crds::App;
use crate::deploy::change_set::ChangeSet;
use crate::error::{Error, Result};
use crate::store::AppStore;

/// A source deploy needs a non-empty source directory and a procfile.
pub fn validate_source_deploy(change_set: &ChangeSet) -> Result<()> {
    change_set.get_source_directory()?;
    change_set.get_procfile_path()?;
    Ok(())
}

pub fn validate_deploy(change_set: &ChangeSet, app: &App) -> Result<()> {
    change_set.get_image()?;

    if change_set.canary_request()?.is_some() && app.spec.deployments.is_empty() {
        return Err(Error::Validation(
            "canary deployment requires an existing deployment".to_string(),
        ));
    }
    if app.canary_active() {
        return Err(Error::Validation(
            "a canary rollout is in progress, wait for it to finish before deploying".to_string(),
        ));
    }
    Ok(())
}

/// Checks that a new App named in `change_set` may be created: a framework
/// must be named, must exist, and must have room under its app quota.
pub async fn validate_create_app(store: &dyn AppStore, change_set: &ChangeSet) -> Result<()> {
    let framework_name = change_set
        .get_framework_name()
        .map_err(|_| Error::Validation("framework is required to create an app".to_string()))?;

    let framework = store
        .get_framework(framework_name)
        .await
        .map_err(|e| Error::FrameworkLookup {
            name: framework_name.to_string(),
            source: Box::new(e),
        })?;

    if let Some(limit) = framework.spec.app_quota_limit {
        if !framework.has_app(&change_set.app_name) && framework.app_count() >= limit as usize {
            return Err(Error::QuotaExceeded {
                framework: framework_name.to_string(),
                limit,
            });
        }
    }
    debug!(app = %change_set.app_name, framework = %framework_name, "App creation permitted");
    Ok(())
}
