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

//! Request body and payload digest.

use crate::hash::{hex_sha256, EMPTY_STRING_SHA256};
use crate::{Error, Result};
use bytes::Bytes;
use log::debug;
use std::fmt::{Debug, Formatter};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Body of an outgoing request.
///
/// A body starts out absent, in memory, or as a stream. Streams are drained
/// into memory the first time the request is digested; from then on the body
/// can be replayed from the start as many times as needed.
#[derive(Default)]
pub struct Body(Inner);

#[derive(Default)]
enum Inner {
    #[default]
    Empty,
    Bytes(Bytes),
    Reader(Box<dyn AsyncRead + Send + Sync + Unpin>),
}

impl Body {
    /// Create a body that marks "no body".
    pub fn empty() -> Self {
        Self(Inner::Empty)
    }

    /// Create a body backed by a stream.
    ///
    /// The stream is read to the end when the request is signed.
    pub fn from_reader(r: impl AsyncRead + Send + Sync + Unpin + 'static) -> Self {
        Self(Inner::Reader(Box::new(r)))
    }

    /// Check if this is the "no body" marker.
    pub fn is_empty(&self) -> bool {
        matches!(self.0, Inner::Empty)
    }

    /// Check if this body can be read again from the start.
    pub fn is_replayable(&self) -> bool {
        !matches!(self.0, Inner::Reader(_))
    }

    /// Open a fresh copy of this body.
    ///
    /// Returns `None` for a stream that has not been buffered yet.
    pub fn try_clone(&self) -> Option<Body> {
        match &self.0 {
            Inner::Empty => Some(Body::empty()),
            Inner::Bytes(bs) => Some(Body(Inner::Bytes(bs.clone()))),
            Inner::Reader(_) => None,
        }
    }

    /// Get the buffered content, `None` for a stream that has not been
    /// buffered yet.
    ///
    /// `Bytes` clones share the same buffer, so calling this for every
    /// attempt never copies the payload.
    pub fn replay(&self) -> Option<Bytes> {
        match &self.0 {
            Inner::Empty => Some(Bytes::new()),
            Inner::Bytes(bs) => Some(bs.clone()),
            Inner::Reader(_) => None,
        }
    }

    /// Drain a stream body into memory and return the buffered content.
    ///
    /// The original stream is dropped once drained. Calling this on an
    /// already buffered body is cheap and returns the same content.
    pub async fn buffer(&mut self) -> Result<Bytes> {
        let mut buf = Vec::new();
        match &mut self.0 {
            Inner::Reader(r) => {
                r.read_to_end(&mut buf).await.map_err(|e| {
                    Error::body_read("failed to read request body").with_source(e)
                })?;
            }
            Inner::Bytes(bs) => return Ok(bs.clone()),
            Inner::Empty => return Ok(Bytes::new()),
        }
        debug!("buffered request body of {} bytes", buf.len());

        let bs = Bytes::from(buf);
        self.0 = Inner::Bytes(bs.clone());
        Ok(bs)
    }
}

impl Debug for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Inner::Empty => f.write_str("Body::Empty"),
            Inner::Bytes(bs) => write!(f, "Body::Bytes({} bytes)", bs.len()),
            Inner::Reader(_) => f.write_str("Body::Reader"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bs: Bytes) -> Self {
        Self(Inner::Bytes(bs))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bs: Vec<u8>) -> Self {
        Bytes::from(bs).into()
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Bytes::from(s).into()
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Bytes::from_static(s.as_bytes()).into()
    }
}

impl From<&'static [u8]> for Body {
    fn from(s: &'static [u8]) -> Self {
        Bytes::from_static(s).into()
    }
}

/// Compute the payload digest of a request body.
///
/// - An absent body returns [`EMPTY_STRING_SHA256`] and is left untouched.
/// - Otherwise the body is buffered in memory (see [`Body::buffer`]) and the
///   hex encoded SHA256 of the buffered bytes is returned.
///
/// Digesting the same body again yields the same value, since the buffered
/// bytes are hashed rather than the original stream.
pub async fn payload_digest(body: &mut Body) -> Result<String> {
    if body.is_empty() {
        return Ok(EMPTY_STRING_SHA256.to_string());
    }

    let bs = body.buffer().await?;
    Ok(hex_sha256(&bs))
}
