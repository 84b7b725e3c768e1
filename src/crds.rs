/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/crds.rs
*
* This file defines the Rust data structures that correspond to the platform's
* Custom Resource Definitions. By using the `kube::CustomResource` derive macro,
* we get a strongly-typed representation of the `App` and `Framework` APIs.
*
* Architecture:
* - `App` is the persistent record of one deployed application. It is the sole
*   unit of optimistic-concurrency control: every deploy is a read-modify-write
*   of a single `App` object, guarded by its `resourceVersion`.
* - `App.spec.deployments` holds one slot in steady state and two while a
*   canary rollout is in progress. `deploymentsCount` is the monotonic source of
*   slot versions and is never decremented.
* - `Framework` is the namespaced placement target an App deploys into. It
*   carries the app quota and the ingress controller settings (including the
*   cluster issuer used for automatic TLS).
* - `serde` attributes map idiomatic Rust `snake_case` to Kubernetes
*   `camelCase`, and `schemars` generates the OpenAPI v3 schema embedded into the
*   CRD manifests.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// --- App Custom Resource Definition ---

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "ph.io",
    version = "v1beta1",
    kind = "App",
    printcolumn = r#"{"name":"Framework", "type":"string", "jsonPath":".spec.framework"}"#,
    printcolumn = r#"{"name":"Deployments", "type":"integer", "jsonPath":".spec.deploymentsCount"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    shortname = "phapp"
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Name of the Framework the app is deployed into. Set once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,

    #[serde(default)]
    pub deployments: Vec<AppDeploymentSpec>,

    /// Number of deployment slots ever created for this app.
    #[serde(default)]
    pub deployments_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary: Option<CanarySpec>,

    #[serde(default)]
    pub ingress: IngressSpec,

    /// Pre-provisioned TLS secrets. When present, the first one is used for
    /// every secure cname instead of framework-issued certificates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_names: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<Env>,

    #[serde(default)]
    pub docker_registry: DockerRegistrySpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Cloud Native Buildpacks builder image used for source deploys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_packs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<MetadataItem>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<MetadataItem>,
}

/// One versioned, independently routable release of an App.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppDeploymentSpec {
    pub image: String,
    pub version: u32,
    #[serde(default)]
    pub processes: Vec<ProcessSpec>,
    #[serde(default)]
    pub routing_settings: RoutingSettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exposed_ports: Vec<ExposedPort>,
    /// Parsed `ph-app.yaml` shipped with the deployment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_config: Option<AppConfigData>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutingSettings {
    /// Share of traffic (0-100) routed to this deployment.
    pub weight: u8,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    pub name: String,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<Env>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<ProcessVolume>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVolume {
    pub name: String,
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Env {
    pub name: String,
    pub value: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DockerRegistrySpec {
    /// Image pull secret in the framework namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

/// State of a staged rollout. Initialised by the deploy core; advanced by the
/// progression controller that reads and writes the same App.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CanarySpec {
    pub steps: u32,
    pub step_weight: u8,
    pub step_time_interval_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scheduled_time: Option<DateTime<Utc>>,
    pub current_step: u32,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    #[serde(default)]
    pub generate_default_cname: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cnames: Vec<Cname>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cname {
    pub name: String,
    #[serde(default)]
    pub secure: bool,
}

/// A label or annotation rule. Unset filters match every deployment version
/// and every process.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetadataItem {
    pub apply: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    pub target: Target,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub api_version: String,
    pub kind: String,
}

impl Target {
    pub fn new(api_version: &str, kind: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExposedPort {
    pub port: u16,
    pub protocol: String,
}

impl ExposedPort {
    /// Parses an image-config port key such as `8080/tcp`. A bare number
    /// defaults to TCP.
    pub fn parse(value: &str) -> Result<Self> {
        let (port, protocol) = match value.split_once('/') {
            Some((port, protocol)) => (port, protocol),
            None => (value, "tcp"),
        };
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::InvalidPort(value.to_string()))?;
        let protocol = protocol.trim().to_ascii_uppercase();
        if !matches!(protocol.as_str(), "TCP" | "UDP" | "SCTP") {
            return Err(Error::InvalidPort(value.to_string()));
        }
        Ok(Self { port, protocol })
    }
}

/// Contents of the optional `ph-app.yaml` shipped with a deployment.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Hooks {
    #[serde(default)]
    pub restart: RestartHooks,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestartHooks {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub processes: BTreeMap<String, ProcessConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ProcessPort>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPort {
    pub name: String,
    pub protocol: String,
    pub port: u16,
    pub target_port: u16,
}

/// Addresses one process of one deployment slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    pub deployment_version: u32,
    pub process_name: String,
}

impl Selector {
    pub fn new(deployment_version: u32, process_name: impl Into<String>) -> Self {
        Self {
            deployment_version,
            process_name: process_name.into(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.deployment_version, self.process_name)
    }
}

impl App {
    /// Sets the replica count of the process addressed by `selector`.
    pub fn set_units(&mut self, selector: &Selector, units: u32) -> Result<()> {
        let process = self
            .spec
            .deployments
            .iter_mut()
            .find(|d| d.version == selector.deployment_version)
            .and_then(|d| {
                d.processes
                    .iter_mut()
                    .find(|p| p.name == selector.process_name)
            })
            .ok_or_else(|| Error::SelectorNotFound {
                version: selector.deployment_version,
                process: selector.process_name.clone(),
            })?;
        process.units = Some(units);
        Ok(())
    }

    pub fn canary_active(&self) -> bool {
        self.spec.canary.as_ref().map_or(false, |c| c.active)
    }
}

// --- Framework Custom Resource Definition ---

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "ph.io",
    version = "v1beta1",
    kind = "Framework",
    status = "FrameworkStatus",
    printcolumn = r#"{"name":"Namespace", "type":"string", "jsonPath":".spec.namespaceName"}"#,
    shortname = "phfw"
)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkSpec {
    pub namespace_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_quota_limit: Option<u32>,
    #[serde(default)]
    pub ingress_controller: IngressControllerSpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressControllerSpec {
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub service_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_issuer: Option<String>,
    #[serde(default)]
    pub ingress_type: IngressControllerType,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IngressControllerType {
    #[default]
    Traefik,
    Istio,
    Nginx,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkStatus {
    #[serde(default)]
    pub apps: Vec<String>,
}

impl Framework {
    pub fn has_app(&self, name: &str) -> bool {
        self.status
            .as_ref()
            .map_or(false, |s| s.apps.iter().any(|a| a == name))
    }

    pub fn app_count(&self) -> usize {
        self.status.as_ref().map_or(0, |s| s.apps.len())
    }
}
