/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/error.rs
*
* This file defines the error taxonomy of the deploy core. Every fallible
* operation in the library returns `Result<T, Error>`; the binary wraps these
* with `anyhow` context at the edge.
*
* Architecture:
* - Validation errors (framework change, missing cluster issuer, unknown
*   selector target, invalid change set) abort a deploy immediately.
* - `Conflict` is the only retryable variant. The conflict retry loop in
*   `retry.rs` restarts the read-modify-write cycle on it and turns an
*   exhausted bound into `RetriesExhausted`.
* - `NotFound` is only meaningful on the initial fetch of an App, where it
*   selects the create path.
* - Upstream failures (build, image config, Kubernetes API) are wrapped with
*   the operation they belong to.
*
* SPDX-License-Identifier: Apache-2.0
*/

use thiserror::Error;

use crate::deploy::change_set::ChangeSetError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("can't change framework once app has been created")]
    FrameworkChange,

    #[error("secure cnames require a framework.Ingress.ClusterIssuer to be specified")]
    ClusterIssuerRequired,

    #[error("can't use image, no entrypoint or commands")]
    NoEntrypoint,

    #[error("deployment version {version} with process '{process}' not found")]
    SelectorNotFound { version: u32, process: String },

    #[error("framework '{framework}' has reached its limit of {limit} app(s)")]
    QuotaExceeded { framework: String, limit: u32 },

    #[error("invalid deploy request: {0}")]
    InvalidChangeSet(#[from] ChangeSetError),

    #[error("{0}")]
    Validation(String),

    #[error("invalid procfile: {0}")]
    Procfile(String),

    #[error("invalid exposed port '{0}'")]
    InvalidPort(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict writing {0}: the object has been modified")]
    Conflict(String),

    #[error("giving up after {attempts} conflicting update(s): {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    #[error("image build failed: {0}")]
    Build(String),

    #[error("failed to read image config: {0}")]
    ImageConfig(String),

    #[error("failed to get framework {name}: {source}")]
    FrameworkLookup {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("could not get app to deploy '{name}': {source}")]
    AppLookup {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{stage} failed: {source}")]
    DeployFailed {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// True when the store rejected a write because the object changed
    /// since it was read.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
