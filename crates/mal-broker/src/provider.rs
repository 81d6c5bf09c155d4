//! Per-provider publish rights.

use crate::keys::PublisherKey;
use mal_types::{Domain, EntityKey, MalError, MalResult, QosLevel, UpdateHeader, Uri};
use std::collections::BTreeSet;
use tracing::warn;

/// What a provider registered with PUBLISH_REGISTER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDetails {
    uri: Uri,
    keys: BTreeSet<PublisherKey>,
    domain: Domain,
    qos_level: QosLevel,
}

impl ProviderDetails {
    pub fn new(uri: Uri, domain: Domain, qos_level: QosLevel, entity_keys: &[EntityKey]) -> Self {
        Self {
            uri,
            keys: entity_keys.iter().map(PublisherKey::from).collect(),
            domain,
            qos_level,
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn qos_level(&self) -> QosLevel {
        self.qos_level
    }

    pub fn keys(&self) -> &BTreeSet<PublisherKey> {
        &self.keys
    }

    /// Validate a publish batch as a unit.
    ///
    /// The domain is checked first. Then every update key must be covered by
    /// a registered key; all uncovered keys are reported together.
    pub fn check_publish(&self, domain: &Domain, updates: &[UpdateHeader]) -> MalResult<()> {
        if !domain.is_sub_domain_of(&self.domain) {
            warn!(
                uri = %self.uri,
                domain = %domain,
                registered = %self.domain,
                "Publish outside registered domain"
            );
            return Err(MalError::DomainViolation {
                domain: domain.clone(),
                registered: self.domain.clone(),
            });
        }

        let violations: Vec<EntityKey> = updates
            .iter()
            .filter(|update| !self.keys.iter().any(|k| k.covers(&update.key)))
            .map(|update| update.key.clone())
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            warn!(
                uri = %self.uri,
                rejected = violations.len(),
                "Publish with unregistered keys"
            );
            Err(MalError::PublishRightsViolation { keys: violations })
        }
    }
}
