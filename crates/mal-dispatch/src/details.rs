//! Per-consumer interaction details.
//!
//! Everything a consumer or publisher puts in the headers it sends, fixed at
//! construction. Copied once into each facade; never mutated after.

use bytes::Bytes;
use mal_types::{
    Domain, Identifier, InteractionStage, InteractionType, MessageHeader, Operation,
    QosLevel, QosProperties, SessionType, TransactionId, Uri,
};

/// Addressing and delivery settings for outgoing interactions.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionDetails {
    /// Provider addressed by SEND to PROGRESS
    pub uri_to: Uri,
    /// Broker addressed by PUBSUB stages; falls back to `uri_to`
    pub broker_uri: Option<Uri>,
    pub authentication_id: Bytes,
    pub domain: Domain,
    pub network_zone: Identifier,
    pub session: SessionType,
    pub session_name: Identifier,
    pub qos_level: QosLevel,
    pub priority: u32,
    pub qos_properties: QosProperties,
}

impl InteractionDetails {
    pub fn new(uri_to: impl Into<Uri>) -> Self {
        Self {
            uri_to: uri_to.into(),
            broker_uri: None,
            authentication_id: Bytes::new(),
            domain: Domain::default(),
            network_zone: Identifier::default(),
            session: SessionType::Live,
            session_name: Identifier::new("LIVE"),
            qos_level: QosLevel::BestEffort,
            priority: 0,
            qos_properties: QosProperties::default(),
        }
    }

    #[must_use]
    pub fn with_broker(mut self, broker_uri: impl Into<Uri>) -> Self {
        self.broker_uri = Some(broker_uri.into());
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    #[must_use]
    pub fn with_authentication_id(mut self, authentication_id: Bytes) -> Self {
        self.authentication_id = authentication_id;
        self
    }

    #[must_use]
    pub fn with_network_zone(mut self, network_zone: impl Into<Identifier>) -> Self {
        self.network_zone = network_zone.into();
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionType, session_name: impl Into<Identifier>) -> Self {
        self.session = session;
        self.session_name = session_name.into();
        self
    }

    #[must_use]
    pub fn with_qos(mut self, qos_level: QosLevel, priority: u32) -> Self {
        self.qos_level = qos_level;
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_qos_properties(mut self, qos_properties: QosProperties) -> Self {
        self.qos_properties = qos_properties;
        self
    }

    /// Destination for messages of this interaction type.
    pub fn destination(&self, interaction_type: InteractionType) -> &Uri {
        match (interaction_type, &self.broker_uri) {
            (InteractionType::PubSub, Some(broker)) => broker,
            _ => &self.uri_to,
        }
    }

    /// Header for an outgoing message of `operation`.
    ///
    /// `uri_from` and the timestamp are stamped by the endpoint.
    pub fn header(
        &self,
        operation: &Operation,
        stage: Option<InteractionStage>,
        transaction_id: Option<TransactionId>,
    ) -> MessageHeader {
        MessageHeader {
            uri_from: Uri::default(),
            authentication_id: self.authentication_id.clone(),
            uri_to: self.destination(operation.interaction_type).clone(),
            timestamp: 0,
            qos_level: self.qos_level,
            priority: self.priority,
            domain: self.domain.clone(),
            network_zone: self.network_zone.clone(),
            session: self.session,
            session_name: self.session_name.clone(),
            interaction_type: operation.interaction_type,
            interaction_stage: stage,
            transaction_id,
            service_area: operation.area,
            service: operation.service,
            operation: operation.number,
            area_version: operation.area_version,
            is_error_message: false,
            qos_properties: self.qos_properties.clone(),
        }
    }
}
