/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/deploy/mod.rs
*
* This module deploys an app: it creates the App resource when it does not
* exist yet, builds an image from source when asked to, and writes the new
* deployment slot.
*
* Architecture:
* 1.  **Plan**: `reconcile::plan_app` applies the change set to the current
*     App in memory to learn the effective framework, builder, build packs
*     and registry secret. Nothing is written.
* 2.  **Upstream calls**: the Framework is fetched for its namespace, the
*     image is built (source deploys), and its configuration is read from the
*     registry. The process list comes from the Procfile (source deploys) or
*     the image's entrypoint and command (image deploys).
* 3.  **Write**: `reconcile::reconcile_app` runs the retried read-modify-write
*     with the resolved deployment. The clock for canary scheduling is read
*     only now, after the upstream calls. Any failure before this point
*     leaves the stored App exactly as it was.
*
* SPDX-License-Identifier: Apache-2.0
*/

pub mod change_set;
pub mod procfile;
pub mod reconcile;
pub mod update;
pub mod validate;

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::builder::{Builder, CreateImageFromSourceRequest, DEFAULT_BUILDER};
use crate::config::Config;
use crate::crds::App;
use crate::error::{Error, Result};
use crate::image::{ImageConfigProvider, ImageConfigRequest};
use crate::store::AppStore;

pub use change_set::ChangeSet;
use change_set::optional;
use procfile::Procfile;
use update::DeploymentRequest;

/// Collaborators a deploy talks to.
pub struct Services {
    pub store: Arc<dyn AppStore>,
    pub builder: Arc<dyn Builder>,
    pub images: Arc<dyn ImageConfigProvider>,
    pub config: Config,
}

pub struct Runner {
    change_set: ChangeSet,
}

impl Runner {
    pub fn new(change_set: ChangeSet) -> Self {
        Self { change_set }
    }

    /// The App after the change set is applied, without building, reading
    /// image config or writing.
    pub async fn plan(&self, svc: &Services) -> Result<App> {
        reconcile::plan_app(svc.store.as_ref(), &self.change_set, &svc.config, Utc::now()).await
    }

    pub async fn run(&self, svc: &Services) -> Result<App> {
        let cs = &self.change_set;
        let planned = reconcile::plan_app(svc.store.as_ref(), cs, &svc.config, Utc::now()).await?;

        let framework_name = planned
            .spec
            .framework
            .clone()
            .ok_or_else(|| Error::Validation(format!("app '{}' has no framework", cs.app_name)))?;
        let framework = svc
            .store
            .get_framework(&framework_name)
            .await
            .map_err(|e| Error::FrameworkLookup {
                name: framework_name.clone(),
                source: Box::new(e),
            })?;

        let image = cs.get_image()?.to_string();
        let app_config = optional(cs.get_app_config())?;

        if cs.is_source_deploy() {
            let request = CreateImageFromSourceRequest {
                image: image.clone(),
                app_name: cs.app_name.clone(),
                builder: planned.spec.builder.clone().unwrap_or_else(|| DEFAULT_BUILDER.to_string()),
                build_packs: planned.spec.build_packs.clone(),
                working_directory: cs.get_source_directory()?.to_path_buf(),
            };
            svc.builder.build(&request).await.map_err(|e| Error::DeployFailed {
                stage: "deploy from source",
                source: Box::new(e),
            })?;
        }

        let image_config = svc
            .images
            .image_config(&ImageConfigRequest {
                image: image.clone(),
                secret_name: planned.spec.docker_registry.secret_name.clone(),
                secret_namespace: framework.spec.namespace_name.clone(),
            })
            .await
            .map_err(|e| Error::DeployFailed {
                stage: "read image config",
                source: Box::new(e),
            })?;

        let procfile = if cs.is_source_deploy() {
            Procfile::from_file(&cs.get_procfile_path()?)?
        } else {
            Procfile::from_image_config(&image_config)?
        };

        let request = DeploymentRequest {
            image,
            procfile,
            exposed_ports: image_config.ports()?,
            app_config,
            canary: cs.canary_request()?,
            units: optional(cs.get_units())?,
            process: optional(cs.get_process())?.map(str::to_string),
        };

        // Canary timestamps start when the slot is written, not before the build.
        let app = reconcile::reconcile_app(
            svc.store.as_ref(),
            cs,
            &svc.config,
            Some(&request),
            &svc.config.retry_config(),
            Utc::now(),
        )
        .await?;

        info!(
            app = %cs.app_name,
            framework = %framework_name,
            image = %request.image,
            canary = request.canary.is_some(),
            deployments_count = app.spec.deployments_count,
            "Deploy complete"
        );
        Ok(app)
    }
}
