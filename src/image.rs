/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/image.rs
*
* This file provides access to a container image's configuration (entrypoint,
* command and exposed ports). Image deploys derive their process list from it
* and every deploy derives the slot's exposed ports from it.
*
* Architecture:
* - `ImageConfigProvider` is the seam the deploy runner depends on.
* - `CraneImageConfig` implements it by shelling out to `crane config`, which
*   prints the image's OCI config JSON. When the App has a registry pull
*   secret, the `kubernetes.io/dockerconfigjson` Secret is read from the
*   framework namespace and exposed to `crane` through a temporary
*   `DOCKER_CONFIG` directory.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::crds::ExposedPort;
use crate::error::{Error, Result};

const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// The parts of an image configuration the deploy core uses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageConfig {
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    /// Port keys as they appear in the image config, e.g. `8080/tcp`.
    pub exposed_ports: Vec<String>,
}

impl ImageConfig {
    /// Parses the OCI image config JSON printed by registry tooling.
    pub fn from_oci_json(raw: &str) -> Result<Self> {
        let file: OciConfigFile = serde_json::from_str(raw)?;
        let config = file.config.unwrap_or_default();
        Ok(Self {
            entrypoint: config.entrypoint.unwrap_or_default(),
            cmd: config.cmd.unwrap_or_default(),
            exposed_ports: config
                .exposed_ports
                .map(|ports| ports.into_keys().collect())
                .unwrap_or_default(),
        })
    }

    pub fn ports(&self) -> Result<Vec<ExposedPort>> {
        self.exposed_ports
            .iter()
            .map(|port| ExposedPort::parse(port))
            .collect()
    }
}

#[derive(Deserialize)]
struct OciConfigFile {
    config: Option<OciConfig>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct OciConfig {
    entrypoint: Option<Vec<String>>,
    cmd: Option<Vec<String>>,
    exposed_ports: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Clone, Debug)]
pub struct ImageConfigRequest {
    pub image: String,
    pub secret_name: Option<String>,
    pub secret_namespace: String,
}

#[async_trait]
pub trait ImageConfigProvider: Send + Sync {
    async fn image_config(&self, request: &ImageConfigRequest) -> Result<ImageConfig>;
}

pub struct CraneImageConfig {
    client: Client,
    binary: String,
}

impl CraneImageConfig {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            binary: std::env::var("PH_CRANE_BINARY").unwrap_or_else(|_| "crane".to_string()),
        }
    }

    /// Writes the pull secret's docker config into a fresh temporary
    /// directory suitable for `DOCKER_CONFIG`.
    async fn docker_config_dir(&self, name: &str, namespace: &str) -> Result<tempfile::TempDir> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets.get(name).await.map_err(|e| {
            Error::ImageConfig(format!("failed to read pull secret '{}/{}': {}", namespace, name, e))
        })?;
        let config = secret
            .data
            .as_ref()
            .and_then(|data| data.get(DOCKER_CONFIG_JSON_KEY))
            .ok_or_else(|| {
                Error::ImageConfig(format!(
                    "pull secret '{}/{}' has no {} key",
                    namespace, name, DOCKER_CONFIG_JSON_KEY
                ))
            })?;

        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("config.json"), &config.0).await?;
        Ok(dir)
    }
}

#[async_trait]
impl ImageConfigProvider for CraneImageConfig {
    async fn image_config(&self, request: &ImageConfigRequest) -> Result<ImageConfig> {
        info!(image = %request.image, "Reading image config");

        let docker_config = match &request.secret_name {
            Some(name) => Some(self.docker_config_dir(name, &request.secret_namespace).await?),
            None => None,
        };

        let mut command = Command::new(&self.binary);
        command
            .args(["config", &request.image])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &docker_config {
            command.env("DOCKER_CONFIG", dir.path());
        }

        let output = command
            .output()
            .await
            .map_err(|e| Error::ImageConfig(format!("failed to run {}: {}", self.binary, e)))?;
        if !output.status.success() {
            return Err(Error::ImageConfig(format!(
                "{} config {}: {}",
                self.binary,
                request.image,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let config = ImageConfig::from_oci_json(&String::from_utf8_lossy(&output.stdout))?;
        debug!(image = %request.image, ?config, "Image config resolved");
        Ok(config)
    }
}
