/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/chart/mod.rs
*
* This module builds `ApplicationChart`, the values model a rendering engine
* turns into the manifests of one App: its Deployments, Services and
* ingress objects.
*
* Architecture:
* - Routing: `ingress::resolve` produces the http hosts and https endpoints.
*   The generated default domain `<app>.<service endpoint>.nip.io` is
*   prepended to the http hosts when the App asks for it.
* - Per slot and process: image, command, units, traffic weight, ports and
*   environment (App env first, process env after), plus the labels and
*   annotations `metadata::apply` selects for the Deployment and the Service
*   of that process.
* - The chart is recomputed on every render and never stored.
*
* SPDX-License-Identifier: Apache-2.0
*/

pub mod ingress;
pub mod metadata;

use std::collections::BTreeMap;

use kube::ResourceExt;
use serde::Serialize;

use crate::crds::{
    App, AppConfigData, Env, ExposedPort, Framework, IngressControllerType, MetadataItem, ProcessSpec, Target,
};
use crate::error::Result;
use ingress::IngressOverlay;
use metadata::{DEPLOYMENT_TARGET, SERVICE_TARGET};

const DEFAULT_DOMAIN_SUFFIX: &str = "nip.io";
const DEFAULT_UNITS: u32 = 1;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl ResourceMetadata {
    fn select(app: &App, target: &Target, version: u32, process: &str) -> Self {
        let pick = |rules: &[MetadataItem]| metadata::apply(rules, target, version, process);
        Self {
            labels: pick(&app.spec.labels),
            annotations: pick(&app.spec.annotations),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessChart {
    pub name: String,
    pub cmd: Vec<String>,
    pub units: u32,
    pub routable: bool,
    pub env: Vec<Env>,
    pub deployment_metadata: ResourceMetadata,
    pub service_metadata: ResourceMetadata,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentChart {
    pub image: String,
    pub version: u32,
    pub weight: u8,
    pub exposed_ports: Vec<ExposedPort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_config: Option<AppConfigData>,
    pub processes: Vec<ProcessChart>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationChart {
    pub app_name: String,
    pub namespace: String,
    pub ingress_class: String,
    pub ingress_controller: IngressControllerType,
    pub ingress: IngressOverlay,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<String>,
    pub deployments: Vec<DeploymentChart>,
}

/// `<app>.<service endpoint>.nip.io`, or `None` without a service endpoint.
pub fn default_domain(app_name: &str, service_endpoint: &str) -> Option<String> {
    if service_endpoint.is_empty() {
        return None;
    }
    Some(format!("{}.{}.{}", app_name, service_endpoint, DEFAULT_DOMAIN_SUFFIX))
}

impl ApplicationChart {
    pub fn new(app: &App, framework: &Framework) -> Result<Self> {
        let app_name = app.name_any();
        let controller = &framework.spec.ingress_controller;

        let mut ingress = ingress::resolve(
            &app_name,
            &app.spec.ingress.cnames,
            &app.spec.secret_names,
            controller.cluster_issuer.as_deref(),
        )?;
        if app.spec.ingress.generate_default_cname {
            if let Some(domain) = default_domain(&app_name, &controller.service_endpoint) {
                ingress.http.insert(0, domain);
            }
        }

        let deployment_target = Target::new(DEPLOYMENT_TARGET.0, DEPLOYMENT_TARGET.1);
        let service_target = Target::new(SERVICE_TARGET.0, SERVICE_TARGET.1);

        let deployments = app
            .spec
            .deployments
            .iter()
            .map(|slot| DeploymentChart {
                image: slot.image.clone(),
                version: slot.version,
                weight: slot.routing_settings.weight,
                exposed_ports: slot.exposed_ports.clone(),
                app_config: slot.app_config.clone(),
                processes: slot
                    .processes
                    .iter()
                    .enumerate()
                    .map(|(i, process)| ProcessChart {
                        name: process.name.clone(),
                        cmd: process.cmd.clone(),
                        units: process.units.unwrap_or(DEFAULT_UNITS),
                        routable: i == 0,
                        env: merged_env(&app.spec.env, process),
                        deployment_metadata: ResourceMetadata::select(
                            app,
                            &deployment_target,
                            slot.version,
                            &process.name,
                        ),
                        service_metadata: ResourceMetadata::select(app, &service_target, slot.version, &process.name),
                    })
                    .collect(),
            })
            .collect();

        Ok(Self {
            app_name,
            namespace: framework.spec.namespace_name.clone(),
            ingress_class: controller.class_name.clone(),
            ingress_controller: controller.ingress_type,
            ingress,
            image_pull_secret: app.spec.docker_registry.secret_name.clone(),
            deployments,
        })
    }
}

fn merged_env(app_env: &[Env], process: &ProcessSpec) -> Vec<Env> {
    app_env.iter().chain(&process.env).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{
        AppDeploymentSpec, AppSpec, Cname, FrameworkSpec, IngressControllerSpec, IngressSpec, RoutingSettings,
    };
    use crate::error::Error;

    fn framework(cluster_issuer: Option<&str>) -> Framework {
        Framework::new(
            "production",
            FrameworkSpec {
                namespace_name: "ph-production".to_string(),
                ingress_controller: IngressControllerSpec {
                    class_name: "traefik".to_string(),
                    service_endpoint: "10.10.10.10".to_string(),
                    cluster_issuer: cluster_issuer.map(str::to_string),
                    ingress_type: IngressControllerType::Traefik,
                },
                ..Default::default()
            },
        )
    }

    fn process(name: &str, cmd: &str, units: Option<u32>) -> ProcessSpec {
        ProcessSpec {
            name: name.to_string(),
            cmd: vec![cmd.to_string()],
            units,
            ..Default::default()
        }
    }

    fn dashboard() -> App {
        let slot = |version: u32, image: &str, weight: u8| AppDeploymentSpec {
            image: image.to_string(),
            version,
            processes: vec![process("web", "python", Some(3)), process("worker", "celery", None)],
            routing_settings: RoutingSettings { weight },
            ..Default::default()
        };
        App::new(
            "dashboard",
            AppSpec {
                framework: Some("production".to_string()),
                deployments: vec![slot(3, "registry/dashboard:v1", 30), slot(4, "registry/dashboard:v2", 70)],
                deployments_count: 4,
                env: vec![Env { name: "VAR".to_string(), value: "VALUE".to_string() }],
                ingress: IngressSpec {
                    generate_default_cname: true,
                    cnames: vec![
                        Cname { name: "theketch.io".to_string(), secure: true },
                        Cname { name: "docs.example.com".to_string(), secure: false },
                    ],
                },
                labels: vec![
                    MetadataItem {
                        apply: BTreeMap::from([("test-label".to_string(), "v3-web".to_string())]),
                        deployment_version: Some(3),
                        process_name: Some("web".to_string()),
                        target: Target::new("apps/v1", "Deployment"),
                    },
                    MetadataItem {
                        apply: BTreeMap::from([("test-label-all".to_string(), "all".to_string())]),
                        deployment_version: None,
                        process_name: None,
                        target: Target::new("apps/v1", "Deployment"),
                    },
                ],
                annotations: vec![MetadataItem {
                    apply: BTreeMap::from([("test-annotation".to_string(), "v4-web".to_string())]),
                    deployment_version: Some(4),
                    process_name: Some("web".to_string()),
                    target: Target::new("v1", "Service"),
                }],
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_chart_routing() {
        let chart = ApplicationChart::new(&dashboard(), &framework(Some("letsencrypt"))).unwrap();

        assert_eq!(chart.namespace, "ph-production");
        assert_eq!(chart.ingress_class, "traefik");
        assert_eq!(
            chart.ingress.http,
            vec!["dashboard.10.10.10.10.nip.io", "docs.example.com"]
        );
        assert_eq!(chart.ingress.https[0].cname, "theketch.io");
        assert_eq!(chart.ingress.https[0].cluster_issuer, "letsencrypt");
        assert!(chart.ingress.https[0].secret_name.starts_with("dashboard-cname-"));
    }

    #[test]
    fn test_chart_requires_issuer_for_secure_cnames() {
        let err = ApplicationChart::new(&dashboard(), &framework(None)).unwrap_err();
        assert!(matches!(err, Error::ClusterIssuerRequired));

        let mut app = dashboard();
        app.spec.secret_names = vec!["foobar".to_string(), "poobar".to_string()];
        let chart = ApplicationChart::new(&app, &framework(None)).unwrap();
        assert_eq!(chart.ingress.https[0].secret_name, "foobar");
        assert_eq!(chart.ingress.https[0].cluster_issuer, "foobar-clusterissuer");
    }

    #[test]
    fn test_chart_processes() {
        let chart = ApplicationChart::new(&dashboard(), &framework(Some("letsencrypt"))).unwrap();
        assert_eq!(chart.deployments.len(), 2);

        let v3 = &chart.deployments[0];
        assert_eq!(v3.weight, 30);
        let web = &v3.processes[0];
        assert!(web.routable);
        assert_eq!(web.units, 3);
        assert_eq!(web.env[0].name, "VAR");
        assert_eq!(web.deployment_metadata.labels.len(), 2);
        assert!(web.service_metadata.annotations.is_empty());

        let worker = &v3.processes[1];
        assert!(!worker.routable);
        assert_eq!(worker.units, 1);
        assert_eq!(
            worker.deployment_metadata.labels,
            BTreeMap::from([("test-label-all".to_string(), "all".to_string())])
        );

        let v4_web = &chart.deployments[1].processes[0];
        assert!(!v4_web.deployment_metadata.labels.contains_key("test-label"));
        assert_eq!(v4_web.service_metadata.annotations["test-annotation"], "v4-web");
    }

    #[test]
    fn test_default_domain_needs_endpoint() {
        assert_eq!(default_domain("dashboard", ""), None);

        let mut app = dashboard();
        app.spec.ingress.generate_default_cname = false;
        let chart = ApplicationChart::new(&app, &framework(Some("letsencrypt"))).unwrap();
        assert_eq!(chart.ingress.http, vec!["docs.example.com"]);
    }
}
