/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/chart/metadata.rs
*
* Selects the App's label and annotation rules that apply to one rendered
* resource and merges them.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::collections::BTreeMap;

use crate::crds::{MetadataItem, Target};

pub const DEPLOYMENT_TARGET: (&str, &str) = ("apps/v1", "Deployment");
pub const SERVICE_TARGET: (&str, &str) = ("v1", "Service");

impl MetadataItem {
    /// An unset version or process filter matches everything on that axis.
    pub fn matches(&self, target: &Target, deployment_version: u32, process_name: &str) -> bool {
        self.target == *target
            && self.deployment_version.map_or(true, |v| v == deployment_version)
            && self.process_name.as_deref().map_or(true, |p| p == process_name)
    }
}

/// Merges every matching rule's key/value pairs; later rules win on a key
/// collision.
pub fn apply(rules: &[MetadataItem], target: &Target, deployment_version: u32, process_name: &str) -> BTreeMap<String, String> {
    rules
        .iter()
        .filter(|rule| rule.matches(target, deployment_version, process_name))
        .flat_map(|rule| rule.apply.iter().map(|(k, v)| (k.clone(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pairs: &[(&str, &str)], target: (&str, &str), version: Option<u32>, process: Option<&str>) -> MetadataItem {
        MetadataItem {
            apply: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            deployment_version: version,
            process_name: process.map(str::to_string),
            target: Target::new(target.0, target.1),
        }
    }

    fn deployment() -> Target {
        Target::new(DEPLOYMENT_TARGET.0, DEPLOYMENT_TARGET.1)
    }

    #[test]
    fn test_unset_filters_broadcast() {
        let rules = vec![rule(&[("team", "billing")], DEPLOYMENT_TARGET, None, None)];
        for (version, process) in [(1, "web"), (2, "worker"), (9, "clock")] {
            let labels = apply(&rules, &deployment(), version, process);
            assert_eq!(labels.get("team").map(String::as_str), Some("billing"));
        }
    }

    #[test]
    fn test_narrow_and_broad_rules_merge() {
        let rules = vec![
            rule(&[("team", "billing")], DEPLOYMENT_TARGET, None, None),
            rule(&[("tier", "frontend")], DEPLOYMENT_TARGET, Some(3), Some("web")),
        ];

        let web_v3 = apply(&rules, &deployment(), 3, "web");
        assert_eq!(web_v3.len(), 2);
        assert_eq!(web_v3["tier"], "frontend");

        let worker_v3 = apply(&rules, &deployment(), 3, "worker");
        assert_eq!(worker_v3.len(), 1);
        let web_v4 = apply(&rules, &deployment(), 4, "web");
        assert!(!web_v4.contains_key("tier"));
    }

    #[test]
    fn test_later_rule_overrides_key() {
        let rules = vec![
            rule(&[("owner", "alice"), ("env", "prod")], DEPLOYMENT_TARGET, None, None),
            rule(&[("owner", "bob")], DEPLOYMENT_TARGET, None, Some("web")),
        ];
        let labels = apply(&rules, &deployment(), 1, "web");
        assert_eq!(labels["owner"], "bob");
        assert_eq!(labels["env"], "prod");

        let labels = apply(&rules, &deployment(), 1, "worker");
        assert_eq!(labels["owner"], "alice");
    }

    #[test]
    fn test_target_must_match_exactly() {
        let rules = vec![
            rule(&[("a", "1")], SERVICE_TARGET, None, None),
            rule(&[("b", "2")], ("v1", "Deployment"), None, None),
        ];
        assert!(apply(&rules, &deployment(), 1, "web").is_empty());

        let service = Target::new(SERVICE_TARGET.0, SERVICE_TARGET.1);
        assert_eq!(apply(&rules, &service, 1, "web").len(), 1);
    }
}
