/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/main.rs
*
* This file is the entry point of the `ph-app` CLI.
*
* Architecture:
* 1.  **Initialization**: Arguments are parsed with `clap`, `tracing` is set
*     up for structured logging and the user configuration is loaded.
* 2.  **Dispatch**:
*     - `builder list` prints the builder catalog and needs no cluster.
*     - `deploy` builds a Kubernetes client, wires the `kube`-backed store,
*       the `pack` builder and the `crane` image inspector into
*       `deploy::Services`, and hands the change set to `deploy::Runner`.
*       With `--dry-run` only the planning pass runs and the planned App is
*       printed as YAML.
* 3.  **Errors**: Library errors are wrapped with `anyhow` context and
*     reported once, with a non-zero exit status.
*
* SPDX-License-Identifier: Apache-2.0 */

mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kube::Client;
use tracing::info;

use ph_app_deployer::builder::{write_builders, PackBuilder};
use ph_app_deployer::config::Config;
use ph_app_deployer::deploy::{Runner, Services};
use ph_app_deployer::image::CraneImageConfig;
use ph_app_deployer::store::KubeStore;
use ph_app_deployer::telemetry;

use cli::{BuilderCommands, Cli, Commands, DeployArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format).map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Builder(BuilderCommands::List) => {
            let mut stdout = std::io::stdout().lock();
            write_builders(&mut stdout, &config.additional_builders).context("failed to print builders")?;
        }
        Commands::Deploy(args) => deploy(args, config).await?,
    }
    Ok(())
}

async fn deploy(args: DeployArgs, config: Config) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let svc = Services {
        store: Arc::new(KubeStore::new(client.clone())),
        builder: Arc::new(PackBuilder::default()),
        images: Arc::new(CraneImageConfig::new(client)),
        config,
    };

    let runner = Runner::new(args.change_set());
    if args.dry_run {
        let app = runner
            .plan(&svc)
            .await
            .with_context(|| format!("failed to plan deploy of '{}'", args.app_name))?;
        print!("{}", serde_yaml::to_string(&app)?);
        return Ok(());
    }

    info!(app = %args.app_name, "Starting deploy");
    let app = runner
        .run(&svc)
        .await
        .with_context(|| format!("failed to deploy '{}'", args.app_name))?;
    info!(
        app = %args.app_name,
        deployments = app.spec.deployments.len(),
        "Successfully deployed"
    );
    Ok(())
}
