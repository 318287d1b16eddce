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

use crate::time::DateTime;
use crate::{Body, Context, Result};
use bytes::Bytes;
use std::fmt::Debug;

/// SigningCredential is the trait used by signer as the signing credential.
pub trait SigningCredential: Clone + Debug + Send + Sync + Unpin + 'static {
    /// Check if the credential is usable for signing right now.
    fn is_valid(&self) -> bool;

    /// Check if the credential is unusable because it expired, or is about
    /// to expire.
    fn is_expired(&self) -> bool {
        false
    }
}

/// ProvideCredential is the trait used by signer to retrieve the credential.
///
/// This is the credential source: it may return static values, read them
/// from somewhere, or exchange a role for temporary credentials over the
/// network. A single instance may be shared by concurrent requests, so
/// implementations that cache must synchronize internally.
///
/// The signing transport asks for a credential on every attempt and never
/// caches it.
#[async_trait::async_trait]
pub trait ProvideCredential: Debug + Send + Sync + Unpin + 'static {
    /// Credential returned by this provider.
    type Credential: Send + Sync + Unpin + 'static;

    /// Retrieve a credential.
    ///
    /// Returns `Ok(None)` if this source has no credential to offer.
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>>;
}

/// SignRequest is the trait used by signer to sign the request.
#[async_trait::async_trait]
pub trait SignRequest: Debug + Send + Sync + Unpin + 'static {
    /// Credential used by this signer.
    type Credential: Send + Sync + Unpin + 'static;

    /// Sign the request in place by adding signature headers.
    ///
    /// ## Payload digest
    ///
    /// The hex encoded SHA256 of the request body, already computed by the
    /// caller. The body itself is never touched here.
    ///
    /// ## Time
    ///
    /// The signing time, captured once per attempt. Every timestamp written
    /// into the request must come from this value.
    async fn sign_request(
        &self,
        ctx: &Context,
        req: &mut http::request::Parts,
        payload_digest: &str,
        credential: &Self::Credential,
        time: DateTime,
    ) -> Result<()>;
}

/// Transport is one layer of the outgoing request chain.
///
/// The request is borrowed mutably so layers can update it in place (signing
/// headers, buffered body) and so an upper layer can hand the same request to
/// the next attempt.
#[async_trait::async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Send the request and return the response.
    async fn send(&self, req: &mut http::Request<Body>) -> Result<http::Response<Bytes>>;
}
