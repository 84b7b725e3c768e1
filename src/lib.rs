/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/lib.rs
*
* Deploy core of the ph application platform. A deploy merges a user request
* into the cluster-scoped `App` resource under optimistic concurrency, starts
* canary rollouts, and derives the routing and metadata model the manifest
* renderer consumes.
*
* Architecture:
* - `deploy`: change set, validation, process diff, canary initiation and the
*   conflict-retried reconciliation loop, driven by `deploy::Runner`.
* - `chart`: ingress/TLS resolution and label/annotation selection.
* - `store`, `builder`, `image`: the seams to the API server, the image
*   builder and the container registry.
* - `crds`, `config`, `retry`, `telemetry`, `error`: shared plumbing.
*
* SPDX-License-Identifier: Apache-2.0
*/

pub mod builder;
pub mod chart;
pub mod config;
pub mod crds;
pub mod deploy;
pub mod error;
pub mod image;
pub mod retry;
pub mod store;
pub mod telemetry;

pub use error::{Error, Result};
