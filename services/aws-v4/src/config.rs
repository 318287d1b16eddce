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

use crate::constants::{AWS_DEFAULT_REGION, AWS_REGION, DEFAULT_SERVICE};
use awscurl_core::{Context, Error, Result};

/// Config for signing requests to aws services.
#[derive(Clone, Debug)]
pub struct Config {
    /// `service` is the name of the service requests are signed for.
    ///
    /// Defaults to `execute-api`.
    pub service: String,
    /// `region` will be loaded from:
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AWS_REGION`]
    /// - env value: [`AWS_DEFAULT_REGION`]
    pub region: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            region: None,
        }
    }
}

impl Config {
    /// Load config from env.
    ///
    /// A region that is already set is kept.
    pub fn from_env(mut self, ctx: &Context) -> Self {
        if self.region.is_none() {
            self.region = [AWS_REGION, AWS_DEFAULT_REGION]
                .into_iter()
                .filter_map(|key| ctx.env_var(key))
                .find(|v| !v.is_empty());
        }
        self
    }

    /// Set the service name.
    pub fn with_service(mut self, service: &str) -> Self {
        self.service = service.to_string();
        self
    }

    /// Set the region.
    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    /// Get the configured region.
    pub fn region(&self) -> Result<&str> {
        self.region.as_deref().ok_or_else(|| {
            Error::config_invalid("region is missing")
                .with_context(format!("set {AWS_REGION} or {AWS_DEFAULT_REGION}"))
        })
    }
}
