/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/deploy/change_set.rs
*
* A `ChangeSet` is the user's deploy request as it arrives from the CLI: every
* field is optional. Getters hand each field to the deploy core already
* checked, returning `ChangeSetError::Missing` when the user did not supply it
* and a specific error when the value is malformed. Callers decide per field
* whether "missing" is acceptable.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::crds::{AppConfigData, Env};
use crate::deploy::procfile::DEFAULT_PROCFILE;
use crate::deploy::update::CanaryRequest;

pub const DEFAULT_APP_CONFIG: &str = "ph-app.yaml";

const MIN_STEPS: u32 = 2;
const MAX_STEPS: u32 = 100;
const MIN_STEP_WEIGHT: u8 = 1;
const MAX_STEP_WEIGHT: u8 = 100;

#[derive(Debug, Error, PartialEq)]
pub enum ChangeSetError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("environment variables should have NAME=VALUE format, got '{0}'")]
    InvalidEnvironment(String),

    #[error("steps must be within the range 2 to 100, got {0}")]
    InvalidSteps(u32),

    #[error("step weight must be within the range 1 to 100, got {0}")]
    InvalidStepWeight(u8),

    #[error("invalid step interval '{0}', expected a number followed by s, m or h")]
    InvalidStepInterval(String),

    #[error("source directory '{}' does not exist", .0.display())]
    SourceNotFound(PathBuf),

    #[error("source directory '{}' is empty", .0.display())]
    SourceEmpty(PathBuf),

    #[error("no procfile found at '{}'", .0.display())]
    ProcfileNotFound(PathBuf),

    #[error("failed to read app config '{}': {message}", .path.display())]
    AppConfig { path: PathBuf, message: String },
}

impl ChangeSetError {
    pub fn is_missing(&self) -> bool {
        matches!(self, ChangeSetError::Missing(_))
    }
}

/// Turns a getter result into `None` when the field was not supplied.
pub fn optional<T>(value: Result<T, ChangeSetError>) -> Result<Option<T>, ChangeSetError> {
    match value {
        Ok(v) => Ok(Some(v)),
        Err(ChangeSetError::Missing(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    pub app_name: String,
    pub image: Option<String>,
    pub framework: Option<String>,
    pub description: Option<String>,
    pub envs: Option<Vec<String>>,
    pub docker_registry_secret: Option<String>,
    pub builder: Option<String>,
    pub build_packs: Option<Vec<String>>,
    pub source_path: Option<PathBuf>,
    pub procfile: Option<PathBuf>,
    pub app_config: Option<PathBuf>,
    pub steps: Option<u32>,
    pub step_weight: Option<u8>,
    pub step_interval: Option<String>,
    pub units: Option<u32>,
    pub process: Option<String>,
}

fn non_empty<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ChangeSetError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(ChangeSetError::Missing(field))
}

impl ChangeSet {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn is_source_deploy(&self) -> bool {
        self.source_path.is_some()
    }

    pub fn get_image(&self) -> Result<&str, ChangeSetError> {
        non_empty(&self.image, "image")
    }

    pub fn get_framework_name(&self) -> Result<&str, ChangeSetError> {
        non_empty(&self.framework, "framework")
    }

    pub fn get_description(&self) -> Result<&str, ChangeSetError> {
        self.description.as_deref().ok_or(ChangeSetError::Missing("description"))
    }

    pub fn get_docker_registry_secret(&self) -> Result<&str, ChangeSetError> {
        non_empty(&self.docker_registry_secret, "registry secret")
    }

    pub fn get_builder(&self) -> Result<&str, ChangeSetError> {
        non_empty(&self.builder, "builder")
    }

    pub fn get_build_packs(&self) -> Result<&[String], ChangeSetError> {
        self.build_packs.as_deref().ok_or(ChangeSetError::Missing("build packs"))
    }

    pub fn get_environments(&self) -> Result<Vec<Env>, ChangeSetError> {
        let envs = self.envs.as_ref().ok_or(ChangeSetError::Missing("environment"))?;
        envs.iter()
            .map(|raw| match raw.split_once('=') {
                Some((name, value)) if !name.trim().is_empty() => Ok(Env {
                    name: name.trim().to_string(),
                    value: value.to_string(),
                }),
                _ => Err(ChangeSetError::InvalidEnvironment(raw.clone())),
            })
            .collect()
    }

    pub fn get_steps(&self) -> Result<u32, ChangeSetError> {
        match self.steps {
            None | Some(0) => Err(ChangeSetError::Missing("steps")),
            Some(steps) if (MIN_STEPS..=MAX_STEPS).contains(&steps) => Ok(steps),
            Some(steps) => Err(ChangeSetError::InvalidSteps(steps)),
        }
    }

    pub fn get_step_weight(&self) -> Result<u8, ChangeSetError> {
        match self.step_weight {
            None => Err(ChangeSetError::Missing("step weight")),
            Some(w) if (MIN_STEP_WEIGHT..=MAX_STEP_WEIGHT).contains(&w) => Ok(w),
            Some(w) => Err(ChangeSetError::InvalidStepWeight(w)),
        }
    }

    pub fn get_step_interval(&self) -> Result<Duration, ChangeSetError> {
        let raw = non_empty(&self.step_interval, "step interval")?;
        parse_duration_str(raw)
    }

    /// Replica count override. Zero means "leave units alone".
    pub fn get_units(&self) -> Result<u32, ChangeSetError> {
        self.units.filter(|u| *u > 0).ok_or(ChangeSetError::Missing("units"))
    }

    pub fn get_process(&self) -> Result<&str, ChangeSetError> {
        non_empty(&self.process, "process")
    }

    /// The source directory, which must exist and contain at least one entry.
    pub fn get_source_directory(&self) -> Result<&Path, ChangeSetError> {
        let path = self.source_path.as_deref().ok_or(ChangeSetError::Missing("source"))?;
        if !path.is_dir() {
            return Err(ChangeSetError::SourceNotFound(path.to_path_buf()));
        }
        let mut entries =
            std::fs::read_dir(path).map_err(|_| ChangeSetError::SourceNotFound(path.to_path_buf()))?;
        if entries.next().is_none() {
            return Err(ChangeSetError::SourceEmpty(path.to_path_buf()));
        }
        Ok(path)
    }

    /// The explicit procfile, or `Procfile` at the root of the source
    /// directory. The file must exist.
    pub fn get_procfile_path(&self) -> Result<PathBuf, ChangeSetError> {
        let path = match (&self.procfile, &self.source_path) {
            (Some(explicit), _) => explicit.clone(),
            (None, Some(source)) => source.join(DEFAULT_PROCFILE),
            (None, None) => return Err(ChangeSetError::Missing("procfile")),
        };
        if !path.is_file() {
            return Err(ChangeSetError::ProcfileNotFound(path));
        }
        Ok(path)
    }

    /// Parses the app config given explicitly, or `ph-app.yaml` from the
    /// source directory when it is present there.
    pub fn get_app_config(&self) -> Result<AppConfigData, ChangeSetError> {
        let path = match (&self.app_config, &self.source_path) {
            (Some(explicit), _) => explicit.clone(),
            (None, Some(source)) if source.join(DEFAULT_APP_CONFIG).is_file() => {
                source.join(DEFAULT_APP_CONFIG)
            }
            _ => return Err(ChangeSetError::Missing("app config")),
        };
        let raw = std::fs::read_to_string(&path).map_err(|e| ChangeSetError::AppConfig {
            path: path.clone(),
            message: e.to_string(),
        })?;
        serde_yaml::from_str(&raw).map_err(|e| ChangeSetError::AppConfig {
            path,
            message: e.to_string(),
        })
    }

    /// Canary parameters, or `None` for a direct deploy. Once steps are
    /// supplied, step weight and step interval become required.
    pub fn canary_request(&self) -> Result<Option<CanaryRequest>, ChangeSetError> {
        let Some(steps) = optional(self.get_steps())? else {
            return Ok(None);
        };
        Ok(Some(CanaryRequest {
            steps,
            step_weight: self.get_step_weight()?,
            step_interval: self.get_step_interval()?,
        }))
    }
}

/// Parses `30s`, `5m` or `1h`.
fn parse_duration_str(s: &str) -> Result<Duration, ChangeSetError> {
    let s = s.trim();
    let invalid = || ChangeSetError::InvalidStepInterval(s.to_string());
    if let Some(num_str) = s.strip_suffix('s') {
        let secs = num_str.parse::<u64>().map_err(|_| invalid())?;
        Ok(Duration::from_secs(secs))
    } else if let Some(num_str) = s.strip_suffix('m') {
        let mins = num_str.parse::<u64>().map_err(|_| invalid())?;
        Ok(Duration::from_secs(mins * 60))
    } else if let Some(num_str) = s.strip_suffix('h') {
        let hours = num_str.parse::<u64>().map_err(|_| invalid())?;
        Ok(Duration::from_secs(hours * 3600))
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_str() {
        assert_eq!(parse_duration_str("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration_str("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration_str(" 2h ").unwrap(), Duration::from_secs(7200));
        assert!(parse_duration_str("5").is_err());
        assert!(parse_duration_str("m").is_err());
        assert!(parse_duration_str("1d").is_err());
    }

    #[test]
    fn test_environments() {
        let mut cs = ChangeSet::new("dashboard");
        assert_eq!(cs.get_environments(), Err(ChangeSetError::Missing("environment")));

        cs.envs = Some(vec!["FOO=bar".to_string(), "URL=http://x?a=b".to_string()]);
        let envs = cs.get_environments().unwrap();
        assert_eq!(envs[0], Env { name: "FOO".to_string(), value: "bar".to_string() });
        assert_eq!(envs[1].value, "http://x?a=b");

        cs.envs = Some(vec!["FOO".to_string()]);
        assert!(matches!(cs.get_environments(), Err(ChangeSetError::InvalidEnvironment(_))));
        cs.envs = Some(vec!["=bar".to_string()]);
        assert!(matches!(cs.get_environments(), Err(ChangeSetError::InvalidEnvironment(_))));
    }

    #[test]
    fn test_steps_bounds() {
        let mut cs = ChangeSet::new("dashboard");
        assert!(cs.get_steps().unwrap_err().is_missing());
        cs.steps = Some(0);
        assert!(cs.get_steps().unwrap_err().is_missing());
        cs.steps = Some(1);
        assert_eq!(cs.get_steps(), Err(ChangeSetError::InvalidSteps(1)));
        cs.steps = Some(101);
        assert_eq!(cs.get_steps(), Err(ChangeSetError::InvalidSteps(101)));
        cs.steps = Some(2);
        assert_eq!(cs.get_steps(), Ok(2));

        cs.step_weight = Some(0);
        assert_eq!(cs.get_step_weight(), Err(ChangeSetError::InvalidStepWeight(0)));
        cs.step_weight = Some(101);
        assert_eq!(cs.get_step_weight(), Err(ChangeSetError::InvalidStepWeight(101)));
    }

    #[test]
    fn test_canary_request() {
        let mut cs = ChangeSet::new("dashboard");
        assert_eq!(cs.canary_request(), Ok(None));

        cs.steps = Some(4);
        assert_eq!(cs.canary_request(), Err(ChangeSetError::Missing("step weight")));

        cs.step_weight = Some(25);
        assert_eq!(cs.canary_request(), Err(ChangeSetError::Missing("step interval")));

        cs.step_interval = Some("1m".to_string());
        assert_eq!(
            cs.canary_request(),
            Ok(Some(CanaryRequest {
                steps: 4,
                step_weight: 25,
                step_interval: Duration::from_secs(60),
            }))
        );
    }

    #[test]
    fn test_source_directory_and_procfile() {
        let dir = tempfile::tempdir().unwrap();
        let mut cs = ChangeSet::new("dashboard");
        cs.source_path = Some(dir.path().to_path_buf());

        assert!(matches!(cs.get_source_directory(), Err(ChangeSetError::SourceEmpty(_))));

        std::fs::write(dir.path().join("main.py"), "print('hi')").unwrap();
        assert_eq!(cs.get_source_directory().unwrap(), dir.path());
        assert!(matches!(cs.get_procfile_path(), Err(ChangeSetError::ProcfileNotFound(_))));

        std::fs::write(dir.path().join("Procfile"), "web: python main.py").unwrap();
        assert_eq!(cs.get_procfile_path().unwrap(), dir.path().join("Procfile"));

        cs.source_path = Some(dir.path().join("missing"));
        assert!(matches!(cs.get_source_directory(), Err(ChangeSetError::SourceNotFound(_))));
    }

    #[test]
    fn test_app_config_from_source_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut cs = ChangeSet::new("dashboard");
        cs.source_path = Some(dir.path().to_path_buf());
        assert!(cs.get_app_config().unwrap_err().is_missing());

        std::fs::write(
            dir.path().join(DEFAULT_APP_CONFIG),
            "hooks:\n  restart:\n    before:\n      - ./migrate.sh\n\
             kubernetes:\n  processes:\n    web:\n      ports:\n        - name: http\n          protocol: TCP\n          port: 80\n          targetPort: 8080\n",
        )
        .unwrap();
        let config = cs.get_app_config().unwrap();
        assert_eq!(config.hooks.unwrap().restart.before, vec!["./migrate.sh"]);
        let ports = &config.kubernetes.unwrap().processes["web"].ports;
        assert_eq!(ports[0].target_port, 8080);

        std::fs::write(dir.path().join(DEFAULT_APP_CONFIG), "hooks: [").unwrap();
        assert!(matches!(cs.get_app_config(), Err(ChangeSetError::AppConfig { .. })));
    }

    #[test]
    fn test_optional() {
        assert_eq!(optional::<u32>(Err(ChangeSetError::Missing("units"))), Ok(None));
        assert_eq!(optional(Ok(3)), Ok(Some(3)));
        assert!(optional::<u32>(Err(ChangeSetError::InvalidSteps(1))).is_err());
    }
}
