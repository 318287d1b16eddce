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

use crate::body::payload_digest;
use crate::time::DateTime;
use crate::{
    time, Body, Context, Error, HttpSend, ProvideCredential, Result, SignRequest,
    SigningCredential, Transport,
};
use bytes::Bytes;
use log::debug;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// SigningTransport signs every outgoing attempt and hands it to the next
/// transport.
///
/// For each attempt:
///
/// 1. Compute the payload digest, buffering the body so it can be replayed.
/// 2. Retrieve a fresh credential from the credential source.
/// 3. Capture the signing time and sign the request in place.
/// 4. Send a copy of the signed request to the next transport and return its
///    response untouched.
///
/// Any failure in steps 1-3 is an [`ErrorKind::Signing`](crate::ErrorKind::Signing)
/// error and the request is not sent.
#[derive(Clone)]
pub struct SigningTransport<K: SigningCredential> {
    ctx: Context,
    provider: Arc<dyn ProvideCredential<Credential = K>>,
    signer: Arc<dyn SignRequest<Credential = K>>,
    next: Arc<dyn HttpSend>,
    time_fn: Arc<dyn Fn() -> DateTime + Send + Sync>,
}

impl<K: SigningCredential> Debug for SigningTransport<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningTransport")
            .field("ctx", &self.ctx)
            .field("provider", &self.provider)
            .field("signer", &self.signer)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

impl<K: SigningCredential> SigningTransport<K> {
    /// Create a new signing transport.
    pub fn new(
        ctx: Context,
        provider: impl ProvideCredential<Credential = K>,
        signer: impl SignRequest<Credential = K>,
        next: impl HttpSend,
    ) -> Self {
        Self {
            ctx,
            provider: Arc::new(provider),
            signer: Arc::new(signer),
            next: Arc::new(next),
            time_fn: Arc::new(time::now),
        }
    }

    /// Replace the clock the signing time is read from.
    ///
    /// It's called once per attempt. Requests must be signed with the current
    /// time, so only use this for testing.
    pub fn with_time_fn(mut self, f: impl Fn() -> DateTime + Send + Sync + 'static) -> Self {
        self.time_fn = Arc::new(f);
        self
    }

    /// Sign the request in place without sending it.
    ///
    /// The body is buffered as a side effect, so the request can be signed
    /// and sent again later. Only the headers are replaced, and only once
    /// signing succeeded: a failed or dropped call leaves the request as it
    /// was, apart from the buffered body.
    pub async fn sign(&self, req: &mut http::Request<Body>) -> Result<()> {
        let digest = payload_digest(req.body_mut())
            .await
            .map_err(|e| signing_error("failed to calculate payload hash", e))?;

        let cred = self.credential().await?;

        let mut head = http::Request::new(());
        *head.method_mut() = req.method().clone();
        *head.uri_mut() = req.uri().clone();
        *head.version_mut() = req.version();
        *head.headers_mut() = req.headers().clone();
        let (mut parts, ()) = head.into_parts();

        let now = (self.time_fn)();
        self.signer
            .sign_request(&self.ctx, &mut parts, &digest, &cred, now)
            .await
            .map_err(|e| signing_error("failed to sign request", e))?;

        *req.headers_mut() = parts.headers;
        Ok(())
    }

    async fn credential(&self) -> Result<K> {
        let cred = self
            .provider
            .provide_credential(&self.ctx)
            .await
            .map_err(|e| signing_error("failed to retrieve credentials", e))?
            .ok_or_else(|| {
                signing_error(
                    "failed to retrieve credentials",
                    Error::credential_invalid("no credential available"),
                )
            })?;

        if cred.is_expired() {
            return Err(signing_error(
                "failed to retrieve credentials",
                Error::credential_expired("credential is expired or about to expire"),
            ));
        }
        if !cred.is_valid() {
            return Err(signing_error(
                "failed to retrieve credentials",
                Error::credential_invalid("credential is incomplete"),
            ));
        }
        Ok(cred)
    }
}

#[async_trait::async_trait]
impl<K: SigningCredential> Transport for SigningTransport<K> {
    async fn send(&self, req: &mut http::Request<Body>) -> Result<http::Response<Bytes>> {
        self.sign(req).await?;

        let payload = req.body().replay().ok_or_else(|| {
            Error::unexpected("request body is not replayable after signing")
        })?;
        let mut signed = http::Request::new(payload);
        *signed.method_mut() = req.method().clone();
        *signed.uri_mut() = req.uri().clone();
        *signed.version_mut() = req.version();
        *signed.headers_mut() = req.headers().clone();

        debug!("sending signed request: {} {}", signed.method(), signed.uri());
        self.next.http_send(signed).await
    }
}

fn signing_error(message: &str, cause: Error) -> Error {
    Error::signing(format!("signature version 4 signing error: {message}")).with_source(cause)
}
