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

//! AWS support with a ready to use client.
//!
//! This module re-exports the SigV4 signing types and adds [`Client`], which
//! wires the retry layer, the signing transport and a delivery transport
//! together.

pub use awscurl_aws_v4::*;

use awscurl_core::{
    Body, Context, HttpSend, ProvideCredential, Result, RetryLayer, RetryPolicy,
    SigningTransport, Transport,
};
use bytes::Bytes;
use log::debug;
use tokio_util::sync::CancellationToken;

/// Client sends requests signed with SigV4, retrying transient failures.
///
/// Requests flow through `RetryLayer -> SigningTransport -> HttpSend`, so
/// every retry is signed again with a fresh timestamp.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> awscurl_core::Result<()> {
/// use awscurl::aws::{Client, Config, StaticCredentialProvider};
/// use awscurl::{Body, Context, NoopHttpSend, RetryPolicy};
///
/// let ctx = Context::new();
/// let config = Config::default().with_region("us-east-1");
/// let client = Client::new(
///     ctx,
///     &config,
///     StaticCredentialProvider::new("access_key_id", "secret_access_key"),
///     NoopHttpSend,
/// )?
/// .with_retry_policy(RetryPolicy::default().with_max_retries(2));
///
/// let mut req = http::Request::get("https://abcdef1234.execute-api.us-east-1.amazonaws.com/prod")
///     .body(Body::empty())?;
/// let _resp = client.send(&mut req).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    transport: RetryLayer<SigningTransport<Credential>>,
}

impl Client {
    /// Create a new client that signs for `config.service` in `config.region`.
    ///
    /// Returns [`ErrorKind::ConfigInvalid`](awscurl_core::ErrorKind::ConfigInvalid)
    /// if no region is configured. Retries are off until
    /// [`Client::with_retry_policy`] is called.
    pub fn new(
        ctx: Context,
        config: &Config,
        provider: impl ProvideCredential<Credential = Credential>,
        http: impl HttpSend,
    ) -> Result<Self> {
        let signer = RequestSigner::new(&config.service, config.region()?);
        debug!(
            "building client for service {} in region {}",
            signer.service(),
            signer.region()
        );

        let signing = SigningTransport::new(ctx, provider, signer, http);
        Ok(Self {
            transport: RetryLayer::new(signing, RetryPolicy::default()),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(self, policy: RetryPolicy) -> Self {
        Self {
            transport: RetryLayer::new(self.transport.inner().clone(), policy),
        }
    }

    /// Get the retry policy in use.
    pub fn retry_policy(&self) -> &RetryPolicy {
        self.transport.policy()
    }

    /// Sign and send the request.
    ///
    /// The body of `req` is buffered on the first attempt and stays buffered,
    /// so the same request can be sent again later.
    pub async fn send(&self, req: &mut http::Request<Body>) -> Result<http::Response<Bytes>> {
        self.transport.send(req).await
    }

    /// Sign and send the request, giving up as soon as `token` is cancelled.
    pub async fn send_cancellable(
        &self,
        req: &mut http::Request<Body>,
        token: &CancellationToken,
    ) -> Result<http::Response<Bytes>> {
        self.transport.send_cancellable(req, token).await
    }
}
