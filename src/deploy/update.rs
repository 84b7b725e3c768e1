/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/deploy/update.rs
*
* This file computes the next `deployments` / `deploymentsCount` / `canary`
* state of an App from a resolved deployment request.
*
* Architecture:
* - Direct deploy onto an App that already has a slot: the request is folded
*   into the newest slot. Its processes are replaced only when
*   `processes_changed` says so; image, exposed ports and app config are
*   always overwritten and the slot takes all traffic. The slot keeps its
*   version and the counter does not move. Any older slot left behind by a
*   finished rollout is dropped rather than kept at its old weight, so the
*   remaining slot alone carries 100.
* - Direct deploy onto an App with no slot: a new slot at
*   `deploymentsCount + 1` with weight 100, and the counter increments.
* - Canary deploy: a new slot is appended at `deploymentsCount + 1` with
*   weight 0 next to the untouched current slot, and canary state is
*   initialised at step 1. Advancing the rollout belongs to the progression
*   controller that watches the App.
* - A positive units override is applied last through a `Selector` on the
*   slot just written. An unknown process fails the whole update.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::crds::{App, AppConfigData, AppDeploymentSpec, CanarySpec, ExposedPort, ProcessSpec, RoutingSettings, Selector};
use crate::deploy::procfile::Procfile;
use crate::error::{Error, Result};

pub const DEFAULT_TRAFFIC_WEIGHT: u8 = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct CanaryRequest {
    pub steps: u32,
    pub step_weight: u8,
    pub step_interval: Duration,
}

/// Everything needed to write a deployment slot, resolved before the
/// read-modify-write cycle starts.
#[derive(Clone, Debug)]
pub struct DeploymentRequest {
    pub image: String,
    pub procfile: Procfile,
    pub exposed_ports: Vec<ExposedPort>,
    pub app_config: Option<AppConfigData>,
    pub canary: Option<CanaryRequest>,
    pub units: Option<u32>,
    /// Process targeted by `units`; the routable process when unset.
    pub process: Option<String>,
}

/// Process list in procfile order: routable process first, then the rest by
/// name.
pub fn processes_from_procfile(procfile: &Procfile) -> Vec<ProcessSpec> {
    procfile
        .sorted_names()
        .into_iter()
        .map(|name| ProcessSpec {
            name: name.to_string(),
            cmd: procfile.processes.get(name).cloned().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

/// Positional comparison of name and command. A length mismatch decides
/// before any element is looked at.
pub fn processes_changed(existing: &[ProcessSpec], desired: &[ProcessSpec]) -> bool {
    if existing.len() != desired.len() {
        return true;
    }
    for (current, next) in existing.iter().zip(desired) {
        if current.name != next.name {
            return true;
        }
        if current.cmd.len() != next.cmd.len() {
            return true;
        }
        if current.cmd.iter().zip(&next.cmd).any(|(a, b)| a != b) {
            return true;
        }
    }
    false
}

pub fn apply_deployment(app: &mut App, request: &DeploymentRequest, now: DateTime<Utc>) -> Result<()> {
    let processes = processes_from_procfile(&request.procfile);

    let version = match &request.canary {
        Some(canary) => start_canary(app, request, processes, canary, now)?,
        None => match app.spec.deployments.pop() {
            Some(mut slot) => {
                if processes_changed(&slot.processes, &processes) {
                    debug!(version = slot.version, "Processes changed, replacing");
                    slot.processes = processes;
                }
                slot.image = request.image.clone();
                slot.exposed_ports = request.exposed_ports.clone();
                slot.app_config = request.app_config.clone();
                slot.routing_settings = RoutingSettings {
                    weight: DEFAULT_TRAFFIC_WEIGHT,
                };
                let version = slot.version;
                app.spec.deployments = vec![slot];
                version
            }
            None => {
                let slot = new_slot(app, request, processes, DEFAULT_TRAFFIC_WEIGHT);
                let version = slot.version;
                app.spec.deployments = vec![slot];
                app.spec.deployments_count += 1;
                app.spec.canary = None;
                version
            }
        },
    };

    if let Some(units) = request.units.filter(|u| *u > 0) {
        let process = request
            .process
            .clone()
            .unwrap_or_else(|| request.procfile.routable_process_name.clone());
        app.set_units(&Selector::new(version, process), units)?;
    }
    Ok(())
}

fn start_canary(
    app: &mut App,
    request: &DeploymentRequest,
    processes: Vec<ProcessSpec>,
    canary: &CanaryRequest,
    now: DateTime<Utc>,
) -> Result<u32> {
    let interval = chrono::Duration::from_std(canary.step_interval)
        .map_err(|_| Error::Validation(format!("step interval {:?} is too large", canary.step_interval)))?;

    let slot = new_slot(app, request, processes, 0);
    let version = slot.version;
    app.spec.deployments.push(slot);
    app.spec.deployments_count += 1;
    app.spec.canary = Some(CanarySpec {
        steps: canary.steps,
        step_weight: canary.step_weight,
        step_time_interval_seconds: canary.step_interval.as_secs(),
        next_scheduled_time: Some(now + interval),
        current_step: 1,
        active: true,
        started: Some(now),
    });
    Ok(version)
}

fn new_slot(app: &App, request: &DeploymentRequest, processes: Vec<ProcessSpec>, weight: u8) -> AppDeploymentSpec {
    AppDeploymentSpec {
        image: request.image.clone(),
        version: app.spec.deployments_count + 1,
        processes,
        routing_settings: RoutingSettings { weight },
        exposed_ports: request.exposed_ports.clone(),
        app_config: request.app_config.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::AppSpec;

    fn process(name: &str, cmd: &[&str]) -> ProcessSpec {
        ProcessSpec {
            name: name.to_string(),
            cmd: cmd.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    fn request(image: &str, procfile: &str) -> DeploymentRequest {
        DeploymentRequest {
            image: image.to_string(),
            procfile: Procfile::parse(procfile).unwrap(),
            exposed_ports: vec![ExposedPort { port: 8080, protocol: "TCP".to_string() }],
            app_config: None,
            canary: None,
            units: None,
            process: None,
        }
    }

    fn deployed_app() -> App {
        App::new(
            "dashboard",
            AppSpec {
                framework: Some("production".to_string()),
                deployments: vec![AppDeploymentSpec {
                    image: "registry/dashboard:v1".to_string(),
                    version: 1,
                    processes: vec![
                        ProcessSpec { units: Some(3), ..process("web", &["python app.py"]) },
                        process("worker", &["celery"]),
                    ],
                    routing_settings: RoutingSettings { weight: 100 },
                    ..Default::default()
                }],
                deployments_count: 1,
                ..Default::default()
            },
        )
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_processes_changed() {
        let existing = vec![process("web", &["python", "app.py"]), process("worker", &["celery"])];

        let same = vec![process("web", &["python", "app.py"]), process("worker", &["celery"])];
        assert!(!processes_changed(&existing, &same));

        let argument = vec![process("web", &["python", "main.py"]), process("worker", &["celery"])];
        assert!(processes_changed(&existing, &argument));

        let renamed = vec![process("web", &["python", "app.py"]), process("jobs", &["celery"])];
        assert!(processes_changed(&existing, &renamed));

        let longer_cmd = vec![process("web", &["python", "app.py", "-v"]), process("worker", &["celery"])];
        assert!(processes_changed(&existing, &longer_cmd));

        assert!(processes_changed(&existing, &existing[..1]));
        assert!(!processes_changed(&[], &[]));
    }

    #[test]
    fn test_processes_from_procfile_puts_routable_first() {
        let procfile = Procfile::parse("worker: celery\nweb: gunicorn app\nclock: clockwork\n").unwrap();
        let names: Vec<_> = processes_from_procfile(&procfile).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["web", "clock", "worker"]);
    }

    #[test]
    fn test_first_deploy_creates_version_one() {
        let mut app = App::new("dashboard", AppSpec::default());
        apply_deployment(&mut app, &request("registry/dashboard:v1", "web: python app.py"), now()).unwrap();

        assert_eq!(app.spec.deployments_count, 1);
        assert_eq!(app.spec.deployments.len(), 1);
        let slot = &app.spec.deployments[0];
        assert_eq!(slot.version, 1);
        assert_eq!(slot.routing_settings.weight, 100);
        assert_eq!(slot.processes, vec![process("web", &["python app.py"])]);
        assert!(app.spec.canary.is_none());
    }

    #[test]
    fn test_unchanged_processes_are_kept_in_place() {
        let mut app = deployed_app();
        let before = app.spec.deployments[0].processes.clone();

        apply_deployment(
            &mut app,
            &request("registry/dashboard:v2", "web: python app.py\nworker: celery"),
            now(),
        )
        .unwrap();

        let slot = &app.spec.deployments[0];
        // Units survive because the existing list was not replaced.
        assert_eq!(slot.processes, before);
        assert_eq!(slot.image, "registry/dashboard:v2");
        assert_eq!(slot.exposed_ports[0].port, 8080);
        assert_eq!(slot.version, 1);
        assert_eq!(app.spec.deployments_count, 1);
    }

    #[test]
    fn test_changed_argument_replaces_whole_list() {
        let mut app = deployed_app();
        apply_deployment(
            &mut app,
            &request("registry/dashboard:v2", "web: python main.py\nworker: celery"),
            now(),
        )
        .unwrap();

        let slot = &app.spec.deployments[0];
        assert_eq!(
            slot.processes,
            vec![process("web", &["python main.py"]), process("worker", &["celery"])]
        );
        assert_eq!(slot.processes[0].units, None);
    }

    #[test]
    fn test_direct_deploy_folds_into_newest_slot() {
        let mut app = deployed_app();
        let mut newer = app.spec.deployments[0].clone();
        newer.version = 2;
        newer.routing_settings.weight = 40;
        app.spec.deployments[0].routing_settings.weight = 60;
        app.spec.deployments.push(newer);
        app.spec.deployments_count = 2;

        apply_deployment(&mut app, &request("registry/dashboard:v3", "web: python app.py"), now()).unwrap();

        assert_eq!(app.spec.deployments.len(), 1);
        assert_eq!(app.spec.deployments[0].version, 2);
        assert_eq!(app.spec.deployments[0].routing_settings.weight, 100);
        assert_eq!(app.spec.deployments_count, 2);
    }

    #[test]
    fn test_canary_appends_slot_at_weight_zero() {
        let mut app = deployed_app();
        let existing = app.spec.deployments[0].clone();
        let mut req = request("registry/dashboard:v2", "web: python app.py");
        req.canary = Some(CanaryRequest {
            steps: 3,
            step_weight: 30,
            step_interval: Duration::from_secs(120),
        });

        apply_deployment(&mut app, &req, now()).unwrap();

        assert_eq!(app.spec.deployments.len(), 2);
        assert_eq!(app.spec.deployments[0], existing);
        let incoming = &app.spec.deployments[1];
        assert_eq!(incoming.version, 2);
        assert_eq!(incoming.routing_settings.weight, 0);
        assert_eq!(app.spec.deployments_count, 2);

        let canary = app.spec.canary.as_ref().unwrap();
        assert!(canary.active);
        assert_eq!(canary.current_step, 1);
        assert_eq!(canary.steps, 3);
        assert_eq!(canary.step_weight, 30);
        assert_eq!(canary.step_time_interval_seconds, 120);
        assert_eq!(canary.started, Some(now()));
        assert_eq!(canary.next_scheduled_time, Some(now() + chrono::Duration::seconds(120)));
    }

    #[test]
    fn test_units_target_written_slot() {
        let mut app = deployed_app();
        let mut req = request("registry/dashboard:v2", "web: python app.py\nworker: celery");
        req.units = Some(4);
        req.process = Some("worker".to_string());
        apply_deployment(&mut app, &req, now()).unwrap();
        assert_eq!(app.spec.deployments[0].processes[1].units, Some(4));

        let mut app = App::new("dashboard", AppSpec::default());
        let mut req = request("registry/dashboard:v1", "web: python app.py");
        req.units = Some(2);
        apply_deployment(&mut app, &req, now()).unwrap();
        assert_eq!(app.spec.deployments[0].processes[0].units, Some(2));
    }

    #[test]
    fn test_unknown_units_process_fails() {
        let mut app = deployed_app();
        let mut req = request("registry/dashboard:v2", "web: python app.py");
        req.units = Some(2);
        req.process = Some("cron".to_string());

        let err = apply_deployment(&mut app, &req, now()).unwrap_err();
        assert!(matches!(err, Error::SelectorNotFound { version: 1, .. }));
    }
}
