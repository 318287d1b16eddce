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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use awscurl::aws::{Client, Config, StaticCredentialProvider};
use awscurl::{Body, Context, ErrorKind, HttpSend, RetryPolicy};
use bytes::Bytes;
use http::{header, Request, Response, StatusCode};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

const URL: &str = "https://abcdef1234.execute-api.us-east-1.amazonaws.com/prod/hello";

/// Answers every request with the same status and counts the calls.
#[derive(Debug, Clone)]
struct CountingHttpSend {
    status: StatusCode,
    calls: Arc<AtomicUsize>,
}

impl CountingHttpSend {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl HttpSend for CountingHttpSend {
    async fn http_send(&self, req: Request<Bytes>) -> awscurl::Result<Response<Bytes>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(req.headers().contains_key(header::AUTHORIZATION));
        Ok(Response::builder()
            .status(self.status)
            .body(req.into_body())?)
    }
}

/// Never answers.
#[derive(Debug, Clone, Default)]
struct HangingHttpSend {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl HttpSend for HangingHttpSend {
    async fn http_send(&self, _: Request<Bytes>) -> awscurl::Result<Response<Bytes>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

fn config() -> Config {
    Config::default().with_region("us-east-1")
}

fn provider() -> StaticCredentialProvider {
    StaticCredentialProvider::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
}

fn hello_request() -> Request<Body> {
    Request::post(URL).body(Body::from("hello")).unwrap()
}

#[test]
fn test_client_requires_region() {
    let err = Client::new(
        Context::new(),
        &Config::default(),
        provider(),
        CountingHttpSend::new(StatusCode::OK),
    )
    .expect_err("region is missing");

    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
}

#[tokio::test]
async fn test_client_sends_once_by_default() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let http = CountingHttpSend::new(StatusCode::SERVICE_UNAVAILABLE);
    let client = Client::new(Context::new(), &config(), provider(), http.clone())?;
    assert_eq!(client.retry_policy().max_retries(), 0);

    let resp = client.send(&mut hello_request()).await?;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.body(), &Bytes::from_static(b"hello"));
    assert_eq!(http.calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_client_retries_server_errors() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let http = CountingHttpSend::new(StatusCode::BAD_GATEWAY);
    let client = Client::new(Context::new(), &config(), provider(), http.clone())?
        .with_retry_policy(RetryPolicy::default().with_max_retries(2));

    let resp = client.send(&mut hello_request()).await?;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(http.calls(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_client_cancel_in_flight() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let http = HangingHttpSend::default();
    let client = Client::new(Context::new(), &config(), provider(), http.clone())?
        .with_retry_policy(RetryPolicy::default().with_max_retries(5));

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        canceller.cancel();
    });

    let err = client
        .send_cancellable(&mut hello_request(), &token)
        .await
        .expect_err("request must be cancelled");
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    Ok(())
}
