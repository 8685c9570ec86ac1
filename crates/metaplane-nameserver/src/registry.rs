//! Tablet registry.
//!
//! Tracks every storage node's liveness, real endpoint, and client handle.
//! The registry itself is pure state under the main mutex; membership events
//! from the metastore watch are reduced into it by the nameserver event loop.

use crate::error::NsError;
use crate::tablet::{TabletProvider, TabletRpc};
use chrono::{DateTime, Utc};
use metaplane::types::TabletState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Liveness record for one tablet.
#[derive(Clone)]
pub struct TabletInfo {
    pub endpoint: String,
    /// Network endpoint when name indirection is enabled.
    pub real_endpoint: Option<String>,
    pub state: TabletState,
    /// Last state change.
    pub ctime: DateTime<Utc>,
    pub client: Arc<dyn TabletRpc>,
}

impl TabletInfo {
    pub fn is_healthy(&self) -> bool {
        self.state == TabletState::Healthy
    }
}

/// Outcome of folding a membership snapshot into the registry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MembershipDiff {
    /// Endpoints seen for the first time.
    pub joined: Vec<String>,
    /// Endpoints that came back before being dropped.
    pub reappeared: Vec<String>,
    /// Endpoints that vanished from the liveness node set.
    pub disappeared: Vec<String>,
}

impl MembershipDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.reappeared.is_empty() && self.disappeared.is_empty()
    }
}

/// `endpoint -> TabletInfo`, driven by the `/nodes` children watch.
#[derive(Default)]
pub struct TabletRegistry {
    tablets: HashMap<String, TabletInfo>,
}

impl TabletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, endpoint: &str) -> Option<&TabletInfo> {
        self.tablets.get(endpoint)
    }

    pub fn get_healthy(&self, endpoint: &str) -> Option<&TabletInfo> {
        self.tablets.get(endpoint).filter(|t| t.is_healthy())
    }

    pub fn client(&self, endpoint: &str) -> Result<Arc<dyn TabletRpc>, NsError> {
        self.get_healthy(endpoint)
            .map(|t| Arc::clone(&t.client))
            .ok_or(NsError::TabletNotHealthy {
                endpoint: endpoint.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &TabletInfo> {
        self.tablets.values()
    }

    /// Healthy endpoints in sorted order (placement relies on the order
    /// being deterministic).
    pub fn healthy_endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self
            .tablets
            .values()
            .filter(|t| t.is_healthy())
            .map(|t| t.endpoint.clone())
            .collect();
        endpoints.sort();
        endpoints
    }

    pub fn healthy_clients(&self) -> Vec<(String, Arc<dyn TabletRpc>)> {
        self.tablets
            .values()
            .filter(|t| t.is_healthy())
            .map(|t| (t.endpoint.clone(), Arc::clone(&t.client)))
            .collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.tablets.values().filter(|t| t.is_healthy()).count()
    }

    /// Whether `endpoint` has been offline for longer than `timeout`.
    pub fn offline_longer_than(
        &self,
        endpoint: &str,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        self.tablets
            .get(endpoint)
            .is_some_and(|t| {
                t.state == TabletState::Offline
                    && now.signed_duration_since(t.ctime).to_std().unwrap_or_default() >= timeout
            })
    }

    /// The real-endpoint map pushed to tablets under name indirection.
    pub fn real_endpoint_map(&self) -> HashMap<String, String> {
        self.tablets
            .values()
            .filter_map(|t| {
                t.real_endpoint
                    .as_ref()
                    .map(|real| (t.endpoint.clone(), real.clone()))
            })
            .collect()
    }

    /// Fold a fresh `/nodes` children snapshot into the registry. New
    /// endpoints get a client from `provider` (and their real endpoint from
    /// `resolve` when name indirection is on); vanished endpoints flip to
    /// Offline but are retained so they can recover.
    pub fn apply_membership(
        &mut self,
        children: &[String],
        provider: &dyn TabletProvider,
        resolve: impl Fn(&str) -> Option<String>,
    ) -> MembershipDiff {
        let now = Utc::now();
        let mut diff = MembershipDiff::default();

        for endpoint in children {
            match self.tablets.get_mut(endpoint) {
                None => {
                    let client = match provider.connect(endpoint) {
                        Ok(client) => client,
                        Err(e) => {
                            tracing::warn!(%endpoint, error = %e, "failed to connect new tablet");
                            continue;
                        }
                    };
                    let real_endpoint = resolve(endpoint);
                    self.tablets.insert(
                        endpoint.clone(),
                        TabletInfo {
                            endpoint: endpoint.clone(),
                            real_endpoint,
                            state: TabletState::Healthy,
                            ctime: now,
                            client,
                        },
                    );
                    diff.joined.push(endpoint.clone());
                }
                Some(info) if info.state == TabletState::Offline => {
                    info.state = TabletState::Healthy;
                    info.ctime = now;
                    diff.reappeared.push(endpoint.clone());
                }
                Some(_) => {}
            }
        }

        for (endpoint, info) in self.tablets.iter_mut() {
            if info.state == TabletState::Healthy && !children.contains(endpoint) {
                info.state = TabletState::Offline;
                info.ctime = now;
                diff.disappeared.push(endpoint.clone());
            }
        }
        diff.disappeared.sort();

        diff
    }
}
