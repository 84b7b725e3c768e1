/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/cli.rs
 * This file defines the command-line interface of the `ph-app` tool using the
 * `clap` crate. Commands and their arguments are declared as structs, which
 * gives typed access to every flag and generates help text from the doc
 * comments.
 * SPDX-License-Identifier: Apache-2.0 */

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use ph_app_deployer::deploy::ChangeSet;
use ph_app_deployer::telemetry::LogFormat;

/// Deploy applications onto the ph platform.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log output format.
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Path to the CLI configuration file. Defaults to $PH_APP_CONFIG or
    /// ~/.ph/config.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy an app from an image or from source code.
    Deploy(DeployArgs),

    /// Manage image builders.
    #[command(subcommand)]
    Builder(BuilderCommands),
}

#[derive(Subcommand, Debug)]
pub enum BuilderCommands {
    /// List the well-known and configured builders.
    List,
}

/// Arguments for the `deploy` command.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Name of the app.
    #[arg(required = true)]
    pub app_name: String,

    /// Source directory to build the image from. Omit to deploy `--image`
    /// as is.
    pub source: Option<PathBuf>,

    /// Image to deploy, or the name of the image to build from source.
    #[arg(long, short)]
    pub image: Option<String>,

    /// Framework the app is deployed into. Required when the app is created.
    #[arg(long, short)]
    pub framework: Option<String>,

    /// Environment variable in NAME=VALUE format. Repeatable.
    #[arg(long = "env", short = 'e')]
    pub envs: Vec<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Image pull secret in the framework namespace.
    #[arg(long)]
    pub registry_secret: Option<String>,

    /// Builder image for source deploys.
    #[arg(long)]
    pub builder: Option<String>,

    /// Build pack for source deploys. Repeatable.
    #[arg(long = "build-packs")]
    pub build_packs: Vec<String>,

    /// Number of canary steps (2-100). Starts a canary rollout when set.
    #[arg(long)]
    pub steps: Option<u32>,

    /// Traffic weight added at each canary step (1-100).
    #[arg(long)]
    pub step_weight: Option<u8>,

    /// Time between canary steps, e.g. 30s, 5m or 1h.
    #[arg(long)]
    pub step_interval: Option<String>,

    /// Replica count for the targeted process.
    #[arg(long)]
    pub units: Option<u32>,

    /// Process that `--units` applies to. Defaults to the routable process.
    #[arg(long)]
    pub process: Option<String>,

    /// Procfile to use instead of <SOURCE>/Procfile.
    #[arg(long)]
    pub procfile: Option<PathBuf>,

    /// App config file to use instead of <SOURCE>/ph-app.yaml.
    #[arg(long)]
    pub app_config: Option<PathBuf>,

    /// Print the planned App without building, reading image config or
    /// writing to the cluster.
    #[arg(long)]
    pub dry_run: bool,
}

impl DeployArgs {
    pub fn change_set(&self) -> ChangeSet {
        let list = |values: &Vec<String>| (!values.is_empty()).then(|| values.clone());
        ChangeSet {
            app_name: self.app_name.clone(),
            image: self.image.clone(),
            framework: self.framework.clone(),
            description: self.description.clone(),
            envs: list(&self.envs),
            docker_registry_secret: self.registry_secret.clone(),
            builder: self.builder.clone(),
            build_packs: list(&self.build_packs),
            source_path: self.source.clone(),
            procfile: self.procfile.clone(),
            app_config: self.app_config.clone(),
            steps: self.steps,
            step_weight: self.step_weight,
            step_interval: self.step_interval.clone(),
            units: self.units,
            process: self.process.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_args_to_change_set() {
        let cli = Cli::parse_from([
            "ph-app",
            "deploy",
            "dashboard",
            "./src",
            "--image",
            "registry/dashboard:v2",
            "--env",
            "A=1",
            "-e",
            "B=2",
            "--steps",
            "4",
            "--step-weight",
            "25",
            "--step-interval",
            "1m",
        ]);
        let Commands::Deploy(args) = cli.command else {
            panic!("expected deploy command");
        };
        let cs = args.change_set();

        assert_eq!(cs.app_name, "dashboard");
        assert_eq!(cs.source_path, Some(PathBuf::from("./src")));
        assert_eq!(cs.envs, Some(vec!["A=1".to_string(), "B=2".to_string()]));
        assert_eq!(cs.build_packs, None);
        assert_eq!(cs.steps, Some(4));
        assert!(!args.dry_run);
    }

    #[test]
    fn test_builder_list() {
        let cli = Cli::parse_from(["ph-app", "--log-format", "json", "builder", "list"]);
        assert!(matches!(cli.command, Commands::Builder(BuilderCommands::List)));
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
