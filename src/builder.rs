/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/builder.rs
*
* This file contains everything the deploy core needs to know about building
* images from source: the `Builder` seam the runner calls, a `pack` CLI based
* implementation, the catalog of well-known Cloud Native Buildpacks builders
* and the rule that decides which builder an App uses.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{error, info};

use crate::error::{Error, Result};

pub const DEFAULT_BUILDER: &str = "heroku/buildpacks:20";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct BuilderInfo {
    pub vendor: String,
    pub image: String,
    pub description: String,
}

impl BuilderInfo {
    fn new(vendor: &str, image: &str, description: &str) -> Self {
        Self {
            vendor: vendor.to_string(),
            image: image.to_string(),
            description: description.to_string(),
        }
    }
}

/// CNCF registered builders shown by `ph-app builder list`.
pub fn known_builders() -> Vec<BuilderInfo> {
    vec![
        BuilderInfo::new("Google", "gcr.io/buildpacks/builder:v1", "GCP Builder for all runtimes"),
        BuilderInfo::new(
            "Heroku",
            "heroku/buildpacks:18",
            "heroku-18 base image with buildpacks for Ruby, Java, Node.js, Python, Golang, & PHP",
        ),
        BuilderInfo::new(
            "Heroku",
            "heroku/buildpacks:20",
            "heroku-20 base image with buildpacks for Ruby, Java, Node.js, Python, Golang, & PHP",
        ),
        BuilderInfo::new(
            "Paketo Buildpacks",
            "paketobuildpacks/builder:base",
            "Small base image with buildpacks for Java, Node.js, Golang, & .NET Core",
        ),
        BuilderInfo::new(
            "Paketo Buildpacks",
            "paketobuildpacks/builder:full",
            "Larger base image with buildpacks for Java, Node.js, Golang, .NET Core, & PHP",
        ),
        BuilderInfo::new(
            "Paketo Buildpacks",
            "paketobuildpacks/builder:tiny",
            "Tiny base image (bionic build image, distroless run image) with buildpacks for Golang",
        ),
    ]
}

/// Writes the known builders followed by `additional` as an aligned table.
pub fn write_builders(out: &mut impl Write, additional: &[BuilderInfo]) -> std::io::Result<()> {
    const MIN_WIDTH: usize = 10;
    const PADDING: usize = 5;

    let mut rows = vec![("VENDOR".to_string(), "IMAGE".to_string(), "DESCRIPTION".to_string())];
    rows.extend(
        known_builders()
            .iter()
            .chain(additional)
            .map(|b| (format!("{}:", b.vendor), b.image.clone(), b.description.clone())),
    );

    let vendor_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0).max(MIN_WIDTH) + PADDING;
    let image_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0).max(MIN_WIDTH) + PADDING;

    for (vendor, image, description) in rows {
        writeln!(
            out,
            "{:<vendor_width$}{:<image_width$}{}",
            vendor,
            image,
            description,
            vendor_width = vendor_width,
            image_width = image_width
        )?;
    }
    Ok(())
}

/// Picks the builder for a source deploy: the requested one, then the one
/// the App already uses, then the configured default.
pub fn resolve_builder(requested: Option<&str>, current: Option<&str>, configured: Option<&str>) -> String {
    requested
        .or(current)
        .or(configured)
        .unwrap_or(DEFAULT_BUILDER)
        .to_string()
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateImageFromSourceRequest {
    pub image: String,
    pub app_name: String,
    pub builder: String,
    pub build_packs: Vec<String>,
    pub working_directory: PathBuf,
}

#[async_trait]
pub trait Builder: Send + Sync {
    /// Builds `request.image` from the source in `request.working_directory`
    /// and publishes it.
    async fn build(&self, request: &CreateImageFromSourceRequest) -> Result<()>;
}

/// Builds images with the Cloud Native Buildpacks `pack` CLI.
pub struct PackBuilder {
    binary: String,
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self {
            binary: std::env::var("PH_PACK_BINARY").unwrap_or_else(|_| "pack".to_string()),
        }
    }
}

impl PackBuilder {
    fn args(request: &CreateImageFromSourceRequest) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            request.image.clone(),
            "--builder".to_string(),
            request.builder.clone(),
        ];
        for build_pack in &request.build_packs {
            args.push("--buildpack".to_string());
            args.push(build_pack.clone());
        }
        args.push("--path".to_string());
        args.push(request.working_directory.display().to_string());
        args.push("--publish".to_string());
        args
    }
}

#[async_trait]
impl Builder for PackBuilder {
    async fn build(&self, request: &CreateImageFromSourceRequest) -> Result<()> {
        info!(
            app = %request.app_name,
            image = %request.image,
            builder = %request.builder,
            "Building image from source"
        );

        let status = Command::new(&self.binary)
            .args(Self::args(request))
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::Build(format!("failed to run {}: {}", self.binary, e)))?;

        if !status.success() {
            error!(app = %request.app_name, %status, "pack build failed");
            return Err(Error::Build(format!("{} build exited with {}", self.binary, status)));
        }
        Ok(())
    }
}
