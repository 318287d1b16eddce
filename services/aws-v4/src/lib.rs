//! AWS Signature Version 4 signing for awscurl.
//!
//! This crate signs requests for any AWS service that accepts SigV4 in the
//! `Authorization` header, `execute-api` by default.
//!
//! ## Example
//!
//! ```no_run
//! use awscurl_aws_v4::{Config, RequestSigner, StaticCredentialProvider};
//! use awscurl_core::{Context, NoopHttpSend, SigningTransport, Transport};
//!
//! # async fn example() -> awscurl_core::Result<()> {
//! let ctx = Context::new();
//! let config = Config::default().with_region("us-east-1");
//!
//! let transport = SigningTransport::new(
//!     ctx,
//!     StaticCredentialProvider::new("access_key_id", "secret_access_key"),
//!     RequestSigner::new(&config.service, config.region()?),
//!     NoopHttpSend,
//! );
//!
//! let mut req = http::Request::get("https://abcdef1234.execute-api.us-east-1.amazonaws.com/prod")
//!     .body(awscurl_core::Body::empty())?;
//! let _resp = transport.send(&mut req).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod constants;
pub use constants::{AWS_DEFAULT_REGION, AWS_REGION, DEFAULT_SERVICE};

mod config;
pub use config::Config;

mod credential;
pub use credential::Credential;

mod provide_credential;
pub use provide_credential::StaticCredentialProvider;

mod sign_request;
pub use sign_request::{RequestSigner, SigningContext};
