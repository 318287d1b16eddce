// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::constants::{
    AWS4_HMAC_SHA256, AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET, UNSIGNED_HEADERS,
    X_AMZ_CONTENT_SHA_256, X_AMZ_DATE, X_AMZ_SECURITY_TOKEN,
};
use crate::Credential;
use async_trait::async_trait;
use awscurl_core::hash::{hex_hmac_sha256, hex_sha256, hmac_sha256};
use awscurl_core::time::{format_date, format_iso8601, DateTime};
use awscurl_core::{Context, Error, Result, SignRequest};
use http::request::Parts;
use http::{header, HeaderValue};
use log::debug;
use percent_encoding::utf8_percent_encode;
use std::collections::BTreeMap;
use std::fmt;

/// RequestSigner signs requests with AWS Signature Version 4 in the
/// `Authorization` header.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    service: String,
    region: String,
}

impl RequestSigner {
    /// Create a new signer for the given service and region.
    pub fn new(service: &str, region: &str) -> Self {
        Self {
            service: service.into(),
            region: region.into(),
        }
    }

    /// Service this signer signs for.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Region this signer signs for.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Build the signing context of one attempt.
    pub fn signing_context(&self, time: DateTime) -> SigningContext {
        SigningContext {
            service: self.service.clone(),
            region: self.region.clone(),
            time,
        }
    }
}

/// Everything a single signature is bound to besides the request itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    /// Service name, e.g. `execute-api`.
    pub service: String,
    /// Region name, e.g. `us-east-1`.
    pub region: String,
    /// Signing time of this attempt.
    pub time: DateTime,
}

impl SigningContext {
    /// Credential scope: `<date>/<region>/<service>/aws4_request`.
    pub fn scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            format_date(self.time),
            self.region,
            self.service
        )
    }

    /// Build the string to sign for a hashed canonical request.
    ///
    /// ```text
    /// AWS4-HMAC-SHA256
    /// 20150830T123600Z
    /// 20150830/us-east-1/execute-api/aws4_request
    /// <hashed_canonical_request>
    /// ```
    fn string_to_sign(&self, hashed_canonical_request: &str) -> String {
        format!(
            "{AWS4_HMAC_SHA256}\n{}\n{}\n{hashed_canonical_request}",
            format_iso8601(self.time),
            self.scope()
        )
    }

    fn signing_key(&self, secret: &str) -> Vec<u8> {
        let secret = format!("AWS4{secret}");
        let sign_date = hmac_sha256(secret.as_bytes(), format_date(self.time).as_bytes());
        let sign_region = hmac_sha256(sign_date.as_slice(), self.region.as_bytes());
        let sign_service = hmac_sha256(sign_region.as_slice(), self.service.as_bytes());
        hmac_sha256(sign_service.as_slice(), b"aws4_request")
    }
}

#[async_trait]
impl SignRequest for RequestSigner {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _: &Context,
        req: &mut Parts,
        payload_digest: &str,
        cred: &Self::Credential,
        time: DateTime,
    ) -> Result<()> {
        let sctx = self.signing_context(time);

        write_auxiliary_headers(req, payload_digest, cred, time)?;

        let creq = CanonicalRequest::build(req, payload_digest)?;
        let creq_string = creq.to_string();
        debug!("calculated canonical request: {creq_string}");

        let string_to_sign = sctx.string_to_sign(&hex_sha256(creq_string.as_bytes()));
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key = sctx.signing_key(&cred.secret_access_key);
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let mut authorization = HeaderValue::from_str(&format!(
            "{AWS4_HMAC_SHA256} Credential={}/{}, SignedHeaders={}, Signature={}",
            cred.access_key_id,
            sctx.scope(),
            creq.signed_headers(),
            signature
        ))?;
        authorization.set_sensitive(true);
        req.headers.insert(header::AUTHORIZATION, authorization);

        Ok(())
    }
}

/// Write the headers that take part in the signature, dropping whatever an
/// earlier signature left behind.
fn write_auxiliary_headers(
    req: &mut Parts,
    payload_digest: &str,
    cred: &Credential,
    time: DateTime,
) -> Result<()> {
    req.headers.remove(header::AUTHORIZATION);

    // Userinfo is part of the authority but never of the host header.
    let host = match (req.uri.host(), req.uri.port_u16()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => {
            return Err(
                Error::request_invalid("request without authority cannot be signed")
                    .with_context(format!("uri: {}", req.uri)),
            )
        }
    };
    if !req.headers.contains_key(header::HOST) {
        req.headers.insert(header::HOST, HeaderValue::from_str(&host)?);
    }

    req.headers
        .insert(X_AMZ_DATE, HeaderValue::from_str(&format_iso8601(time))?);
    req.headers
        .insert(X_AMZ_CONTENT_SHA_256, HeaderValue::from_str(payload_digest)?);

    match &cred.session_token {
        Some(token) => {
            let mut value = HeaderValue::from_str(token)?;
            // Set token value sensitive to avoid leaking.
            value.set_sensitive(true);
            req.headers.insert(X_AMZ_SECURITY_TOKEN, value);
        }
        None => {
            req.headers.remove(X_AMZ_SECURITY_TOKEN);
        }
    }

    Ok(())
}

/// The normalized form of a request that gets hashed into the signature.
#[derive(Debug)]
struct CanonicalRequest<'a> {
    method: &'a str,
    path: String,
    query: Vec<(String, String)>,
    headers: BTreeMap<String, String>,
    payload_digest: &'a str,
}

impl<'a> CanonicalRequest<'a> {
    fn build(req: &'a Parts, payload_digest: &'a str) -> Result<Self> {
        let path = match req.uri.path() {
            "" => "/".to_string(),
            // The path is already escaped, encoding it again is what every
            // service but S3 expects.
            path => utf8_percent_encode(path, &AWS_URI_ENCODE_SET).to_string(),
        };

        let mut query: Vec<(String, String)> = req
            .uri
            .query()
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| {
                        (
                            utf8_percent_encode(&k, &AWS_QUERY_ENCODE_SET).to_string(),
                            utf8_percent_encode(&v, &AWS_QUERY_ENCODE_SET).to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        query.sort();

        let mut headers = BTreeMap::new();
        for name in req.headers.keys() {
            if UNSIGNED_HEADERS.contains(&name.as_str()) {
                continue;
            }
            let mut values = Vec::new();
            for value in req.headers.get_all(name) {
                values.push(normalize_header_value(value.to_str()?));
            }
            headers.insert(name.as_str().to_string(), values.join(","));
        }

        Ok(Self {
            method: req.method.as_str(),
            path,
            query,
            headers,
            payload_digest,
        })
    }

    fn signed_headers(&self) -> String {
        self.headers
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Display for CanonicalRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.method)?;
        writeln!(f, "{}", self.path)?;
        writeln!(
            f,
            "{}",
            self.query
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&")
        )?;
        for (name, value) in &self.headers {
            writeln!(f, "{name}:{value}")?;
        }
        writeln!(f)?;
        writeln!(f, "{}", self.signed_headers())?;
        write!(f, "{}", self.payload_digest)
    }
}

/// Trim the value and collapse inner whitespace runs into a single space.
fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
