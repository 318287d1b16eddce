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

//! Core components for sending signed requests.
//!
//! This crate provides the foundational types and traits for awscurl: how a
//! request body is digested and replayed, how credentials are retrieved, how
//! a request is signed and forwarded, and how failed deliveries are retried.
//!
//! ## Overview
//!
//! Requests flow through a chain of [`Transport`]s:
//!
//! ```text
//! caller -> RetryLayer -> SigningTransport -> HttpSend (network)
//!                              |
//!                              +-> payload_digest (Body)
//!                              +-> ProvideCredential
//!                              +-> SignRequest
//! ```
//!
//! - [`SigningTransport`] digests the body, retrieves a credential, signs the
//!   request with a freshly captured time, and hands it to an [`HttpSend`].
//! - [`RetryLayer`] resends failed attempts with bounded, growing backoff.
//!   Every retry goes through signing again.
//! - [`Context`] carries the collaborators credential sources may need.
//!
//! ## Example
//!
//! ```no_run
//! use awscurl_core::{
//!     Body, Context, HttpSend, ProvideCredential, Result, RetryLayer, RetryPolicy,
//!     SignRequest, SigningCredential, SigningTransport, Transport,
//! };
//! use awscurl_core::time::DateTime;
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use http::request::Parts;
//!
//! #[derive(Clone, Debug)]
//! struct MyCredential {
//!     token: String,
//! }
//!
//! impl SigningCredential for MyCredential {
//!     fn is_valid(&self) -> bool {
//!         !self.token.is_empty()
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct MyProvider;
//!
//! #[async_trait]
//! impl ProvideCredential for MyProvider {
//!     type Credential = MyCredential;
//!
//!     async fn provide_credential(&self, _: &Context) -> Result<Option<MyCredential>> {
//!         Ok(Some(MyCredential {
//!             token: "my-token".to_string(),
//!         }))
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct MySigner;
//!
//! #[async_trait]
//! impl SignRequest for MySigner {
//!     type Credential = MyCredential;
//!
//!     async fn sign_request(
//!         &self,
//!         _: &Context,
//!         req: &mut Parts,
//!         _payload_digest: &str,
//!         cred: &MyCredential,
//!         _time: DateTime,
//!     ) -> Result<()> {
//!         req.headers.insert("x-token", cred.token.parse()?);
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct MyHttpSend;
//!
//! #[async_trait]
//! impl HttpSend for MyHttpSend {
//!     async fn http_send(&self, _: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
//!         Ok(http::Response::new(Bytes::new()))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let transport = SigningTransport::new(Context::new(), MyProvider, MySigner, MyHttpSend);
//! let client = RetryLayer::new(transport, RetryPolicy::default().with_max_retries(3));
//!
//! let mut req = http::Request::builder()
//!     .method("POST")
//!     .uri("https://example.com")
//!     .body(Body::from("hello"))?;
//! let resp = client.send(&mut req).await?;
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod body;
pub use body::payload_digest;
pub use body::Body;
mod context;
pub use context::Context;
pub use context::Env;
pub use context::HttpSend;
pub use context::NoopEnv;
pub use context::NoopHttpSend;
pub use context::OsEnv;
pub use context::StaticEnv;
mod error;
pub use error::{Error, ErrorKind, Result};

mod api;
pub use api::{ProvideCredential, SignRequest, SigningCredential, Transport};
mod signer;
pub use signer::SigningTransport;
mod retry;
pub use retry::{DefaultRetryClassifier, RetryClassifier, RetryLayer, RetryPolicy};
