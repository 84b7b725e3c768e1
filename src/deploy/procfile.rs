/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/deploy/procfile.rs
*
* Process files map process names to startup commands. A deploy gets its
* process list either from a user-supplied Procfile (source deploys) or from
* the image's entrypoint and command (image deploys).
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::image::ImageConfig;

/// The process that receives routed traffic when the Procfile defines it.
pub const DEFAULT_ROUTABLE_PROCESS_NAME: &str = "web";

pub const DEFAULT_PROCFILE: &str = "Procfile";

#[derive(Clone, Debug, PartialEq)]
pub struct Procfile {
    pub processes: BTreeMap<String, Vec<String>>,
    pub routable_process_name: String,
}

impl Procfile {
    /// Parses `name: command` lines. Lines that do not match are ignored,
    /// which also skips comments and blank lines.
    pub fn parse(content: &str) -> Result<Self> {
        let mut processes = BTreeMap::new();
        for line in content.lines() {
            let Some((name, cmd)) = line.split_once(':') else {
                continue;
            };
            let cmd = cmd.trim();
            if !is_process_name(name) || cmd.is_empty() {
                continue;
            }
            processes.insert(name.to_string(), vec![cmd.to_string()]);
        }

        let routable_process_name = if processes.contains_key(DEFAULT_ROUTABLE_PROCESS_NAME) {
            DEFAULT_ROUTABLE_PROCESS_NAME.to_string()
        } else {
            processes
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| Error::Procfile("can't parse procfile, no processes found".to_string()))?
        };

        Ok(Self {
            processes,
            routable_process_name,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Builds a single-process Procfile from an image's entrypoint and command.
    pub fn from_image_config(config: &ImageConfig) -> Result<Self> {
        let cmds: Vec<String> = config
            .entrypoint
            .iter()
            .chain(config.cmd.iter())
            .cloned()
            .collect();
        if cmds.is_empty() {
            return Err(Error::NoEntrypoint);
        }
        Ok(Self {
            processes: BTreeMap::from([(DEFAULT_ROUTABLE_PROCESS_NAME.to_string(), cmds)]),
            routable_process_name: DEFAULT_ROUTABLE_PROCESS_NAME.to_string(),
        })
    }

    /// Process names with the routable process first and the rest in
    /// lexical order.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names = vec![self.routable_process_name.as_str()];
        names.extend(
            self.processes
                .keys()
                .map(String::as_str)
                .filter(|name| *name != self.routable_process_name),
        );
        names
    }
}

fn is_process_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_procfile() {
        let procfile = Procfile::parse(
            "# processes\n\
             worker: celery worker -A app\n\
             \n\
             web:   gunicorn app:app --bind 0.0.0.0:$PORT  \n\
             not a process line\n",
        )
        .unwrap();

        assert_eq!(procfile.routable_process_name, "web");
        assert_eq!(procfile.processes.len(), 2);
        assert_eq!(
            procfile.processes["web"],
            vec!["gunicorn app:app --bind 0.0.0.0:$PORT".to_string()]
        );
        assert_eq!(procfile.sorted_names(), vec!["web", "worker"]);
    }

    #[test]
    fn test_routable_process_falls_back_to_first_name() {
        let procfile = Procfile::parse("worker: celery\nclock: clockwork\nalpha: run\n").unwrap();
        assert_eq!(procfile.routable_process_name, "alpha");
        assert_eq!(procfile.sorted_names(), vec!["alpha", "clock", "worker"]);
    }

    #[test]
    fn test_empty_procfile_is_an_error() {
        let err = Procfile::parse("# nothing here\n\n").unwrap_err();
        assert!(matches!(err, Error::Procfile(_)));
    }

    #[test]
    fn test_from_image_config() {
        let config = ImageConfig {
            entrypoint: vec!["/bin/server".to_string()],
            cmd: vec!["--port".to_string(), "8080".to_string()],
            ..Default::default()
        };
        let procfile = Procfile::from_image_config(&config).unwrap();
        assert_eq!(procfile.routable_process_name, "web");
        assert_eq!(procfile.processes["web"], vec!["/bin/server", "--port", "8080"]);

        let err = Procfile::from_image_config(&ImageConfig::default()).unwrap_err();
        assert!(matches!(err, Error::NoEntrypoint));
    }
}
