//! Request-level hit tracking: identity, enrichment, counting, notification.

use std::sync::Arc;

use tracing::debug;

use crate::blob::Channel;
use crate::counter::{CounterStore, HitOutcome, Report};
use crate::enrich::{Enrichment, Metadata};
use crate::error::StoreError;
use crate::identity::IdentityPolicy;
use crate::lock::Lock;
use crate::notify::{Notification, Notifier, NotifyPolicy};

/// What the HTTP layer knows about a hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hit {
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub page: String,
}

#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub key: String,
    pub metadata: Metadata,
    pub hit: HitOutcome,
    /// Whether a notification was queued for this hit.
    pub notified: bool,
}

/// Owns the counter store and everything a hit passes through on its way in.
pub struct Tracker<C, L = crate::lock::InMemoryLock> {
    counter: CounterStore<C, L>,
    enrichment: Enrichment,
    identity: IdentityPolicy,
    notifier: Option<Arc<Notifier>>,
    notify_policy: NotifyPolicy,
}

impl<C: Channel, L: Lock> Tracker<C, L> {
    pub fn new(counter: CounterStore<C, L>) -> Self {
        Self {
            counter,
            enrichment: Enrichment::disabled(),
            identity: IdentityPolicy::default(),
            notifier: None,
            notify_policy: NotifyPolicy::default(),
        }
    }

    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn with_identity(mut self, identity: IdentityPolicy) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<Notifier>, policy: NotifyPolicy) -> Self {
        self.notifier = Some(notifier);
        self.notify_policy = policy;
        self
    }

    pub fn counter(&self) -> &CounterStore<C, L> {
        &self.counter
    }

    pub fn notifier(&self) -> Option<&Arc<Notifier>> {
        self.notifier.as_ref()
    }

    pub fn identity(&self) -> IdentityPolicy {
        self.identity
    }

    /// Count a hit. Enrichment and notification never fail it; only the
    /// store can.
    pub fn track(&self, hit: &Hit) -> Result<TrackOutcome, StoreError> {
        let key = self
            .identity
            .visitor_key(&hit.client_ip, hit.user_agent.as_deref());
        let metadata = self
            .enrichment
            .resolve(&hit.client_ip, hit.user_agent.as_deref());

        let outcome = self.counter.record_hit(&key, &metadata)?;

        let notified = match &self.notifier {
            Some(notifier) if self.notify_policy.should_notify(outcome.is_new) => {
                notifier.submit(Notification::from_hit(&hit.page, &outcome, &metadata))
            }
            _ => false,
        };
        debug!(page = %hit.page, is_new = outcome.is_new, notified, "tracked hit");

        Ok(TrackOutcome {
            key,
            metadata,
            hit: outcome,
            notified,
        })
    }

    pub fn report(&self) -> Result<Report, StoreError> {
        self.counter.query()
    }
}
