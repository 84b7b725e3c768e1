/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/chart/ingress.rs
*
* Turns an App's custom domains into the routing and TLS overlay consumed by
* the ingress templates.
*
* Secure domains get their certificate from one of two places. When the App
* carries its own TLS secrets, the first one serves every secure domain and
* its issuer is named `<secret>-clusterissuer`. Otherwise the framework's
* cluster issuer provisions one certificate per domain, stored in a secret
* whose name is derived from the domain so that re-rendering never asks for
* a new certificate.
*
* SPDX-License-Identifier: Apache-2.0
*/

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::crds::Cname;
use crate::error::{Error, Result};

const SECRET_HASH_LEN: usize = 20;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpsEndpoint {
    pub cname: String,
    pub secret_name: String,
    pub cluster_issuer: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressOverlay {
    pub http: Vec<String>,
    pub https: Vec<HttpsEndpoint>,
}

/// Name of the secret holding the framework-issued certificate for `cname`.
pub fn cname_secret_name(app_name: &str, cname: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(format!("cname-{}", cname).as_bytes()));
    format!("{}-cname-{}", app_name, &digest[..SECRET_HASH_LEN])
}

pub fn resolve(
    app_name: &str,
    cnames: &[Cname],
    secret_names: &[String],
    cluster_issuer: Option<&str>,
) -> Result<IngressOverlay> {
    let cluster_issuer = cluster_issuer.filter(|issuer| !issuer.is_empty());
    let app_secret = secret_names.first().filter(|secret| !secret.is_empty());
    let mut overlay = IngressOverlay::default();

    for cname in cnames {
        if !cname.secure {
            overlay.http.push(cname.name.clone());
            continue;
        }
        let endpoint = match (app_secret, cluster_issuer) {
            (Some(secret), _) => HttpsEndpoint {
                cname: cname.name.clone(),
                secret_name: secret.clone(),
                cluster_issuer: format!("{}-clusterissuer", secret),
            },
            (None, Some(issuer)) => HttpsEndpoint {
                cname: cname.name.clone(),
                secret_name: cname_secret_name(app_name, &cname.name),
                cluster_issuer: issuer.to_string(),
            },
            (None, None) => return Err(Error::ClusterIssuerRequired),
        };
        overlay.https.push(endpoint);
    }
    Ok(overlay)
}
