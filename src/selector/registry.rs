//! Match registry
//!
//! Ordered mapping from protocol key to virtual listener, plus the optional
//! catch-all. Registration happens at startup, so a `Vec` scanned in
//! registration order is both the simplest and the fastest structure here.

use bytes::Bytes;

use super::listener::VirtualListener;
use crate::common::{Result, SelectorError};
use crate::protocol::MatchRule;

struct Route {
    key: Bytes,
    listener: VirtualListener,
}

#[derive(Default)]
pub(crate) struct Registry {
    routes: Vec<Route>,
    default: Option<VirtualListener>,
}

fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

impl Registry {
    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        self.routes.iter().any(|route| route.key == key)
    }

    pub(crate) fn insert(&mut self, key: Bytes, listener: VirtualListener) -> Result<()> {
        if self.contains(&key) {
            return Err(SelectorError::DuplicateKey(display_key(&key)));
        }
        self.routes.push(Route { key, listener });
        Ok(())
    }

    pub(crate) fn set_default(&mut self, listener: VirtualListener) -> Result<()> {
        if self.default.is_some() {
            return Err(SelectorError::DuplicateDefault);
        }
        self.default = Some(listener);
        Ok(())
    }

    pub(crate) fn remove(&mut self, key: &[u8]) -> Result<VirtualListener> {
        let index = self
            .routes
            .iter()
            .position(|route| route.key == key)
            .ok_or_else(|| SelectorError::UnknownKey(display_key(key)))?;
        Ok(self.routes.remove(index).listener)
    }

    pub(crate) fn take_default(&mut self) -> Option<VirtualListener> {
        self.default.take()
    }

    /// Pick the destination for a peeked prefix
    ///
    /// The first key that matches, in registration order, wins; otherwise the
    /// default listener, if any.
    pub(crate) fn route(&self, peeked: &[u8], rule: &dyn MatchRule, header_size: usize) -> Option<VirtualListener> {
        self.routes
            .iter()
            .find(|route| rule.matches(peeked, &route.key, header_size))
            .map(|route| route.listener.clone())
            .or_else(|| self.default.clone())
    }

    pub(crate) fn keys(&self) -> Vec<Bytes> {
        self.routes.iter().map(|route| route.key.clone()).collect()
    }

    /// Remove every listener, default included
    pub(crate) fn drain(&mut self) -> Vec<VirtualListener> {
        let mut listeners: Vec<VirtualListener> =
            self.routes.drain(..).map(|route| route.listener).collect();
        listeners.extend(self.default.take());
        listeners
    }
}
