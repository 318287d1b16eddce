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

//! Bounded retry around a [`Transport`].

use crate::time::{now, parse_http_date};
use crate::{Body, Error, Result, Transport};
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use bytes::Bytes;
use http::header::RETRY_AFTER;
use http::StatusCode;
use log::{debug, warn};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// RetryClassifier decides whether the outcome of an attempt is worth
/// another attempt.
pub trait RetryClassifier: Debug + Send + Sync + 'static {
    /// Returns `true` if the request should be sent again.
    fn is_retryable(&self, result: &Result<http::Response<Bytes>>) -> bool;
}

/// DefaultRetryClassifier retries transient failures only.
///
/// - Errors are retried when flagged by [`Error::is_retryable`]. Delivery
///   transports flag connectivity failures; signing and cancellation errors
///   are never flagged.
/// - Responses are retried on `5xx`, except `501 Not Implemented`.
/// - `4xx` responses are returned to the caller as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRetryClassifier;

impl RetryClassifier for DefaultRetryClassifier {
    fn is_retryable(&self, result: &Result<http::Response<Bytes>>) -> bool {
        match result {
            Ok(resp) => {
                resp.status().is_server_error() && resp.status() != StatusCode::NOT_IMPLEMENTED
            }
            Err(err) => err.is_retryable(),
        }
    }
}

/// RetryPolicy controls how many times and how patiently a request is
/// resent.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    min_backoff: Duration,
    max_backoff: Duration,
    classifier: Arc<dyn RetryClassifier>,
}

impl Default for RetryPolicy {
    /// No retries, with a backoff window of 1s to 10min once enabled.
    fn default() -> Self {
        Self {
            max_retries: 0,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(600),
            classifier: Arc::new(DefaultRetryClassifier),
        }
    }
}

impl RetryPolicy {
    /// Set the number of retries after the first attempt.
    ///
    /// `0` means the request is sent exactly once.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the wait before the first retry.
    pub fn with_min_backoff(mut self, backoff: Duration) -> Self {
        self.min_backoff = backoff;
        self
    }

    /// Set the upper bound of any wait between attempts.
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Replace the retry classifier.
    pub fn with_classifier(mut self, classifier: impl RetryClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Check if the outcome of an attempt should be retried.
    pub fn is_retryable(&self, result: &Result<http::Response<Bytes>>) -> bool {
        self.classifier.is_retryable(result)
    }

    /// Build the waits between attempts: one per retry, doubling from
    /// `min_backoff` and never exceeding `max_backoff`.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.min_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(2.0)
            .with_max_times(self.max_retries as usize)
            .build()
    }

    /// Wait asked for by the server, if any.
    ///
    /// Only a `503` response carrying `Retry-After` asks for one. It's
    /// clamped to `[min_backoff, max_backoff]`.
    pub fn retry_after(&self, result: &Result<http::Response<Bytes>>) -> Option<Duration> {
        let wait = result.as_ref().ok().and_then(retry_after)?;
        Some(wait.max(self.min_backoff).min(self.max_backoff))
    }
}

/// Parse `Retry-After` of a `503` response, in either delay-seconds or
/// http-date form.
fn retry_after(resp: &http::Response<Bytes>) -> Option<Duration> {
    if resp.status() != StatusCode::SERVICE_UNAVAILABLE {
        return None;
    }
    let value = resp.headers().get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = parse_http_date(value).ok()?;
    Some((at - now()).to_std().unwrap_or(Duration::ZERO))
}

/// RetryLayer resends failed attempts through the inner transport.
///
/// Every attempt goes through the inner transport again, so a signing
/// transport below re-signs each attempt with a fresh timestamp and replays
/// the buffered body.
///
/// Once the retries are exhausted, or the classifier rejects an outcome, that
/// outcome is returned as it is. Intermediate failures are only logged.
#[derive(Debug, Clone)]
pub struct RetryLayer<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryLayer<T> {
    /// Wrap a transport with the given policy.
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Get the wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Get the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send the request, stopping as soon as `token` is cancelled.
    ///
    /// Cancellation aborts the in-flight attempt or the backoff wait and
    /// returns an [`ErrorKind::Cancelled`](crate::ErrorKind::Cancelled)
    /// error; no further attempt is made.
    pub async fn send_cancellable(
        &self,
        req: &mut http::Request<Body>,
        token: &CancellationToken,
    ) -> Result<http::Response<Bytes>> {
        let mut backoff = self.policy.backoff();
        let mut attempt = 0;
        loop {
            debug!(
                "sending {} {}, attempt {}/{}",
                req.method(),
                req.uri(),
                attempt + 1,
                self.policy.max_retries + 1
            );
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(cancelled(attempt)),
                result = self.inner.send(req) => result,
            };

            if !self.policy.is_retryable(&result) {
                return result;
            }
            let Some(wait) = backoff.next() else {
                return result;
            };
            let wait = self.policy.retry_after(&result).unwrap_or(wait);
            let left = self.policy.max_retries - attempt;
            match &result {
                Ok(resp) => warn!(
                    "request got status {}, retrying in {wait:?} ({left} retries left)",
                    resp.status()
                ),
                Err(err) => warn!("request failed: {err}, retrying in {wait:?} ({left} retries left)"),
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(cancelled(attempt)),
                _ = tokio::time::sleep(wait) => {}
            }
            attempt += 1;
        }
    }
}

#[async_trait::async_trait]
impl<T: Transport> Transport for RetryLayer<T> {
    async fn send(&self, req: &mut http::Request<Body>) -> Result<http::Response<Bytes>> {
        self.send_cancellable(req, &CancellationToken::new()).await
    }
}

fn cancelled(attempt: u32) -> Error {
    Error::cancelled("request cancelled").with_context(format!("attempt: {}", attempt + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_case::test_case;
    use tokio::time::Instant;

    type Outcome = Box<dyn Fn(usize) -> Result<http::Response<Bytes>> + Send + Sync>;

    /// Returns the outcome produced for each attempt index.
    struct ScriptedTransport {
        calls: AtomicUsize,
        outcome: Outcome,
    }

    impl ScriptedTransport {
        fn new(f: impl Fn(usize) -> Result<http::Response<Bytes>> + Send + Sync + 'static) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome: Box::new(f),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Debug for ScriptedTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ScriptedTransport")
                .field("calls", &self.calls)
                .finish()
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _: &mut http::Request<Body>) -> Result<http::Response<Bytes>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)(n)
        }
    }

    fn status(code: u16) -> Result<http::Response<Bytes>> {
        let mut resp = http::Response::new(Bytes::new());
        *resp.status_mut() = StatusCode::from_u16(code).unwrap();
        Ok(resp)
    }

    fn connection_error(n: usize) -> Result<http::Response<Bytes>> {
        Err(Error::delivery(format!("attempt {} failed", n + 1)).set_retryable(true))
    }

    fn layer(t: ScriptedTransport, max_retries: u32) -> RetryLayer<ScriptedTransport> {
        RetryLayer::new(t, RetryPolicy::default().with_max_retries(max_retries))
    }

    fn request() -> http::Request<Body> {
        http::Request::new(Body::empty())
    }

    #[track_caller]
    fn assert_elapsed(start: Instant, secs: u64) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_secs(secs + 1),
            "expected about {secs}s to pass, got {elapsed:?}"
        );
    }

    #[test_case(503; "server error")]
    #[test_case(200; "success")]
    #[test_case(400; "client error")]
    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_sends_once(code: u16) {
        let layer = layer(ScriptedTransport::new(move |_| status(code)), 0);
        let start = Instant::now();

        let resp = layer.send(&mut request()).await.unwrap();

        assert_eq!(resp.status().as_u16(), code);
        assert_eq!(layer.inner().calls(), 1);
        assert_elapsed(start, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_returns_error_after_one_attempt() {
        let layer = layer(ScriptedTransport::new(connection_error), 0);

        let err = layer.send(&mut request()).await.unwrap_err();

        assert_eq!(err.message(), "attempt 1 failed");
        assert_eq!(layer.inner().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let layer = layer(ScriptedTransport::new(connection_error), 3);

        let err = layer.send(&mut request()).await.unwrap_err();

        assert!(err.is_delivery_error());
        assert_eq!(err.message(), "attempt 4 failed");
        assert_eq!(layer.inner().calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_response() {
        let layer = layer(ScriptedTransport::new(|_| status(502)), 2);

        let resp = layer.send(&mut request()).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(layer.inner().calls(), 3);
    }

    #[test_case(400; "bad request")]
    #[test_case(403; "forbidden")]
    #[test_case(429; "too many requests")]
    #[test_case(501; "not implemented")]
    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_short_circuits(code: u16) {
        let layer = layer(ScriptedTransport::new(move |_| status(code)), 5);

        let resp = layer.send(&mut request()).await.unwrap();

        assert_eq!(resp.status().as_u16(), code);
        assert_eq!(layer.inner().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signing_error_short_circuits() {
        let layer = layer(
            ScriptedTransport::new(|_| {
                Err(Error::signing("signature version 4 signing error: failed to retrieve credentials"))
            }),
            5,
        );

        let err = layer.send(&mut request()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Signing);
        assert_eq!(layer.inner().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let layer = layer(
            ScriptedTransport::new(|n| match n {
                0 => connection_error(n),
                1 => status(500),
                _ => status(200),
            }),
            5,
        );
        let start = Instant::now();

        let resp = layer.send(&mut request()).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(layer.inner().calls(), 3);
        // 1s after the first attempt, 2s after the second.
        assert_elapsed(start, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let layer = layer(ScriptedTransport::new(|_| status(503)), 3);
        let start = Instant::now();

        layer.send(&mut request()).await.unwrap();

        assert_eq!(layer.inner().calls(), 4);
        assert_elapsed(start, 1 + 2 + 4);
    }

    #[test]
    fn test_backoff_growth() {
        let policy = RetryPolicy::default().with_max_retries(12);
        let waits: Vec<u64> = policy.backoff().map(|d| d.as_secs()).collect();

        assert_eq!(
            waits,
            vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 600, 600]
        );
    }

    #[test]
    fn test_backoff_without_retries_is_empty() {
        assert_eq!(RetryPolicy::default().backoff().next(), None);
    }

    #[test]
    fn test_backoff_honors_retry_after() {
        let policy = RetryPolicy::default().with_max_backoff(Duration::from_secs(30));
        let with_retry_after = |code: u16, value: &str| -> Result<http::Response<Bytes>> {
            let mut resp = status(code).unwrap();
            resp.headers_mut()
                .insert(RETRY_AFTER, value.parse().unwrap());
            Ok(resp)
        };

        assert_eq!(
            policy.retry_after(&with_retry_after(503, "5")),
            Some(Duration::from_secs(5))
        );
        // Clamped into the backoff window.
        assert_eq!(
            policy.retry_after(&with_retry_after(503, "3600")),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            policy.retry_after(&with_retry_after(503, "0")),
            Some(Duration::from_secs(1))
        );
        // A date in the past means "now", raised to the minimum wait.
        assert_eq!(
            policy.retry_after(&with_retry_after(503, "Tue, 01 Mar 2022 08:12:34 GMT")),
            Some(Duration::from_secs(1))
        );
        // Only honored on 503.
        assert_eq!(policy.retry_after(&with_retry_after(500, "5")), None);
        assert_eq!(policy.retry_after(&status(503)), None);
        assert_eq!(policy.retry_after(&connection_error(0)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_overrides_backoff() {
        let layer = layer(
            ScriptedTransport::new(|n| match n {
                0 => {
                    let mut resp = status(503).unwrap();
                    resp.headers_mut()
                        .insert(RETRY_AFTER, "7".parse().unwrap());
                    Ok(resp)
                }
                _ => status(200),
            }),
            2,
        );
        let start = Instant::now();

        let resp = layer.send(&mut request()).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(layer.inner().calls(), 2);
        assert_elapsed(start, 7);
    }

    #[test]
    fn test_default_classifier() {
        let c = DefaultRetryClassifier;
        assert!(c.is_retryable(&status(500)));
        assert!(c.is_retryable(&status(503)));
        assert!(!c.is_retryable(&status(501)));
        assert!(!c.is_retryable(&status(404)));
        assert!(!c.is_retryable(&status(200)));
        assert!(c.is_retryable(&connection_error(0)));
        assert!(!c.is_retryable(&Err(Error::delivery("invalid url"))));
        assert!(!c.is_retryable(&Err(Error::signing("no credential"))));
    }

    #[derive(Debug)]
    struct RetryEverything;

    impl RetryClassifier for RetryEverything {
        fn is_retryable(&self, _: &Result<http::Response<Bytes>>) -> bool {
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_classifier() {
        let layer = RetryLayer::new(
            ScriptedTransport::new(|_| status(404)),
            RetryPolicy::default()
                .with_max_retries(2)
                .with_classifier(RetryEverything),
        );

        let resp = layer.send(&mut request()).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(layer.inner().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retrying() {
        let layer = RetryLayer::new(
            ScriptedTransport::new(|_| status(503)),
            RetryPolicy::default()
                .with_max_retries(5)
                .with_min_backoff(Duration::from_secs(10)),
        );
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(15)).await;
                token.cancel();
            })
        };

        let err = layer
            .send_cancellable(&mut request(), &token)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(!err.is_retryable());
        // Attempts at 0s and 10s, cancelled while waiting 20s for the third.
        assert_eq!(layer.inner().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_send() {
        let layer = layer(ScriptedTransport::new(|_| status(200)), 3);
        let token = CancellationToken::new();
        token.cancel();

        let err = layer
            .send_cancellable(&mut request(), &token)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(layer.inner().calls(), 0);
    }
}
