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

//! Deliver signed requests with [`reqwest`].

use async_trait::async_trait;
use awscurl_core::{Error, HttpSend, Result};
use bytes::Bytes;
use http_body_util::BodyExt;
use log::debug;
use reqwest::{Client, Request};

/// ReqwestHttpSend sends requests through a [`reqwest::Client`].
///
/// Failures while talking to the server are flagged retryable; a request
/// that cannot even be converted is not.
#[derive(Debug, Default, Clone)]
pub struct ReqwestHttpSend {
    client: Client,
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend with a reqwest::Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let target = format!("{} {}", req.method(), req.uri());
        let req = Request::try_from(req).map_err(|e| {
            Error::request_invalid("request can't be sent by reqwest")
                .with_context(format!("request: {target}"))
                .with_source(e)
        })?;

        let resp: http::Response<_> = self
            .client
            .execute(req)
            .await
            .map_err(|e| delivery_error("failed to send request", &target, e))?
            .into();
        debug!("received response for {target}: {}", resp.status());

        let (parts, body) = resp.into_parts();
        let bs = BodyExt::collect(body)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(|e| delivery_error("failed to read response body", &target, e))?;
        Ok(http::Response::from_parts(parts, bs))
    }
}

fn delivery_error(message: &str, target: &str, err: reqwest::Error) -> Error {
    Error::delivery(message)
        .with_context(format!("request: {target}"))
        .with_source(err)
        .set_retryable(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use awscurl_core::ErrorKind;
    use std::net::TcpListener;

    #[tokio::test]
    async fn test_relative_uri_is_invalid() {
        let req = http::Request::get("/prod/hello")
            .body(Bytes::new())
            .unwrap();

        let err = ReqwestHttpSend::default()
            .http_send(req)
            .await
            .expect_err("relative uri must be rejected");
        assert_eq!(err.kind(), ErrorKind::RequestInvalid);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let _ = env_logger::builder().is_test(true).try_init();

        // Grab a free port and close it again, nothing listens there.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let req = http::Request::get(format!("http://127.0.0.1:{port}/prod/hello"))
            .body(Bytes::new())
            .unwrap();

        let err = ReqwestHttpSend::default()
            .http_send(req)
            .await
            .expect_err("nothing listens on the port");
        assert_eq!(err.kind(), ErrorKind::Delivery);
        assert!(err.is_retryable());
    }
}
