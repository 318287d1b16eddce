#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use awscurl_core::*;

#[cfg(feature = "default-context")]
mod context;
#[cfg(feature = "default-context")]
pub use context::default_context;
#[cfg(feature = "default-context")]
pub use awscurl_http_send_reqwest::ReqwestHttpSend;

pub mod aws;
