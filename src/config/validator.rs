//! Configuration validator
//!
//! Hard errors come from `validate`; problems that still allow the selector
//! to run are reported by `check`.

use log::warn;
use std::collections::HashSet;
use std::net::IpAddr;

use super::SelectorConfig;
use crate::common::net::split_host_port;
use crate::common::{Result, SelectorError};
use crate::protocol::MatchRule;
use crate::selector::MAX_HEADER_SIZE;

fn invalid(message: String) -> SelectorError {
    SelectorError::Config(message)
}

/// Validate a backend address without resolving it
fn validate_target(field: &str, target: &str) -> Result<()> {
    match split_host_port(target)? {
        (Some(_), _) => Ok(()),
        (None, _) => Err(invalid(format!("{} has no host: {}", field, target))),
    }
}

impl SelectorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_listener()?;
        self.validate_routes()?;
        self.validate_general()?;
        Ok(())
    }

    fn validate_listener(&self) -> Result<()> {
        if self.header_size == 0 || self.header_size > MAX_HEADER_SIZE {
            return Err(SelectorError::InvalidHeaderSize(self.header_size));
        }

        if let Some(host) = self.host.as_deref() {
            if let Ok(ip) = host.parse::<IpAddr>() {
                if !self.network.accepts(&ip) {
                    return Err(invalid(format!(
                        "Host {} does not belong to network {}",
                        ip, self.network
                    )));
                }
            }
        }

        if self.listen_backlog == 0 {
            return Err(invalid("listen_backlog must be greater than 0".to_string()));
        }

        Ok(())
    }

    fn validate_routes(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for route in &self.routes {
            let key = route.key.as_bytes();
            if key.is_empty() {
                return Err(SelectorError::InvalidKeyLength {
                    key: route.key.clone(),
                    len: 0,
                    reason: "keys must not be empty".to_string(),
                });
            }
            if key.len() > self.header_size {
                return Err(SelectorError::InvalidKeyLength {
                    key: route.key.clone(),
                    len: key.len(),
                    reason: format!("longer than header size {}", self.header_size),
                });
            }
            self.match_mode.validate_key(key, self.header_size)?;

            if !seen.insert(key) {
                return Err(SelectorError::DuplicateKey(route.key.clone()));
            }

            validate_target(&format!("Target for key {:?}", route.key), &route.target)?;
        }

        if let Some(target) = self.default_target.as_deref() {
            validate_target("default_target", target)?;
        }

        Ok(())
    }

    fn validate_general(&self) -> Result<()> {
        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => {
                warn!("Invalid log level: {}. Using default: info", level);
            }
        }

        if self.buffer_size == 0 {
            return Err(invalid("buffer_size must be greater than 0".to_string()));
        }

        if self.connection_timeout == 0 {
            return Err(invalid("connection_timeout must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Check configuration for warnings
    pub fn check(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.routes.is_empty() && self.default_target.is_none() {
            warnings.push("No routes configured: every connection will be closed".to_string());
        } else if self.default_target.is_none() {
            warnings.push("No default_target: connections matching no key will be closed".to_string());
        }

        for (i, earlier) in self.routes.iter().enumerate() {
            for later in &self.routes[i + 1..] {
                if later.key.as_bytes().starts_with(earlier.key.as_bytes()) {
                    warnings.push(format!(
                        "Key {:?} shadows later key {:?}; the first registered match wins",
                        earlier.key, later.key
                    ));
                }
            }
        }

        if self.peek_timeout_ms == 0 {
            warnings.push(
                "peek_timeout_ms is 0: silent clients can hold a connection open forever".to_string(),
            );
        }

        if self.queue_capacity == 0 {
            warnings.push("queue_capacity is 0: virtual listener queues are unbounded".to_string());
        }

        if self.buffer_size < 1024 {
            warnings.push(format!(
                "Buffer size is very small ({} bytes). This may impact performance.",
                self.buffer_size
            ));
        }

        warnings
    }
}
