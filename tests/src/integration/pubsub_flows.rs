//! # Publish-Subscribe Flows
//!
//! One broker node, one publishing provider and up to two consumers, all on
//! the same in-memory transport.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use mal_broker::BrokerEngine;
    use mal_dispatch::{MalRuntime, Publisher};
    use mal_interaction::InteractionListener;
    use mal_transport::InMemoryTransport;
    use mal_types::{
        error_numbers, Element, EntityKey, Identifier, MalError, SubscriptionUpdate, UpdateType,
        Uri,
    };
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Setup {
        transport: Arc<InMemoryTransport>,
        broker: Arc<MalRuntime>,
        engine: Arc<BrokerEngine>,
        provider: Arc<MalRuntime>,
    }

    impl Setup {
        fn new() -> Self {
            let transport = InMemoryTransport::new();
            let (broker, engine) = broker_node(&transport, "broker");
            let provider = node(&transport, "provider");
            Self {
                transport,
                broker,
                engine,
                provider,
            }
        }

        fn consumer_node(&self, name: &str) -> Arc<MalRuntime> {
            node(&self.transport, name)
        }

        async fn publisher(
            &self,
            keys: Vec<EntityKey>,
            listener: Arc<dyn InteractionListener>,
        ) -> Publisher {
            let publisher = self
                .provider
                .publisher(self.provider.details(self.broker.uri().clone()), MONITOR)
                .unwrap();
            publisher.register(keys, listener).await.unwrap();
            publisher
        }
    }

    async fn subscribe(
        setup: &Setup,
        consumer: &MalRuntime,
        id: &str,
        only_on_change: bool,
        keys: Vec<EntityKey>,
        listener: Arc<dyn InteractionListener>,
    ) {
        consumer
            .consumer(consumer.details(setup.broker.uri().clone()))
            .register(&MONITOR, subscription(id, only_on_change, keys), listener)
            .await
            .unwrap();
    }

    fn single_update(event: &Event) -> SubscriptionUpdate {
        assert_eq!(event.kind, "notify");
        let updates = event.message.body.subscription_update_list(0).unwrap();
        assert_eq!(updates.len(), 1);
        updates[0].clone()
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
        while !check() {
            assert!(tokio::time::Instant::now() < deadline, "condition never held");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    // =============================================================================
    // REGISTRATION
    // =============================================================================

    #[tokio::test]
    async fn test_wildcard_subscription_receives_notify() {
        let setup = Setup::new();
        let consumer = setup.consumer_node("watcher");
        let (listener, mut events) = RecordingListener::new();
        subscribe(&setup, &consumer, "all", false, vec![EntityKey::wildcard()], listener).await;

        let (publisher_listener, _publish_events) = RecordingListener::new();
        let publisher = setup.publisher(vec![EntityKey::wildcard()], publisher_listener).await;
        let source = setup.provider.uri().clone();
        publisher
            .publish(
                vec![update(&source, UpdateType::Creation, key("foo", 5, 1, 2))],
                vec![vec![Element::Long(99)]],
            )
            .await
            .unwrap();

        let update = single_update(&events.next().await);
        assert_eq!(update.subscription_id, Identifier::from("all"));
        assert_eq!(update.update_headers[0].key, key("foo", 5, 1, 2));
        assert_eq!(update.value_lists, vec![vec![Element::Long(99)]]);
    }

    #[tokio::test]
    async fn test_same_subscription_id_on_two_operations() {
        let setup = Setup::new();
        let consumer = setup.consumer_node("watcher");
        let (monitor_listener, mut monitor_events) = RecordingListener::new();
        let (alarm_listener, mut alarm_events) = RecordingListener::new();
        subscribe(&setup, &consumer, "s", false, vec![EntityKey::wildcard()], monitor_listener).await;
        consumer
            .consumer(consumer.details(setup.broker.uri().clone()))
            .register(
                &MONITOR_ALARMS,
                subscription("s", false, vec![EntityKey::wildcard()]),
                alarm_listener,
            )
            .await
            .unwrap();
        assert_eq!(setup.engine.source_count(), 2);

        let (publisher_listener, _publish_events) = RecordingListener::new();
        let publisher = setup.publisher(vec![EntityKey::wildcard()], publisher_listener).await;
        let source = setup.provider.uri().clone();
        publisher
            .publish(
                vec![update(&source, UpdateType::Update, key("temp", 1, 1, 1))],
                vec![vec![Element::Long(7)]],
            )
            .await
            .unwrap();

        let delivered = single_update(&monitor_events.next().await);
        assert_eq!(delivered.subscription_id, Identifier::from("s"));
        assert_eq!(delivered.value_lists, vec![vec![Element::Long(7)]]);
        alarm_events.assert_quiet(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_publish_before_register_rejected_locally() {
        let setup = Setup::new();
        let publisher = setup
            .provider
            .publisher(setup.provider.details(setup.broker.uri().clone()), MONITOR)
            .unwrap();

        let err = publisher.publish(vec![], vec![]).await.unwrap_err();
        assert!(matches!(err, MalError::IncorrectState(_)));
    }

    #[tokio::test]
    async fn test_publisher_for_request_operation_rejected() {
        let setup = Setup::new();
        let result = setup
            .provider
            .publisher(setup.provider.details(setup.broker.uri().clone()), ECHO);
        assert!(result.is_err());
    }

    // =============================================================================
    // PUBLISH RIGHTS
    // =============================================================================

    #[tokio::test]
    async fn test_publish_rights_accept_and_reject() {
        let setup = Setup::new();
        let consumer = setup.consumer_node("watcher");
        let (listener, mut events) = RecordingListener::new();
        subscribe(&setup, &consumer, "all", false, vec![EntityKey::wildcard()], listener).await;

        let (publisher_listener, mut publish_events) = RecordingListener::new();
        let publisher = setup.publisher(vec![key("a", 0, 0, 0)], publisher_listener).await;
        let source = setup.provider.uri().clone();

        publisher
            .publish(
                vec![update(&source, UpdateType::Update, key("a", 1, 2, 3))],
                vec![vec![Element::Long(1)]],
            )
            .await
            .unwrap();
        assert_eq!(single_update(&events.next().await).update_headers[0].key, key("a", 1, 2, 3));

        publisher
            .publish(
                vec![update(&source, UpdateType::Update, key("b", 1, 2, 3))],
                vec![vec![Element::Long(2)]],
            )
            .await
            .unwrap();

        let rejection = publish_events.next().await;
        assert_eq!(rejection.kind, "publish_error");
        let err = rejection.message.body.standard_error().unwrap();
        assert_eq!(err.number, error_numbers::UNKNOWN);
        assert_eq!(err.extra_information, Element::EntityKeyList(vec![key("b", 1, 2, 3)]));

        // Nothing from the rejected batch reached the consumer.
        events.assert_quiet(Duration::from_millis(50)).await;
    }

    // =============================================================================
    // FAN-OUT
    // =============================================================================

    #[tokio::test]
    async fn test_on_change_and_on_all_fan_out() {
        let setup = Setup::new();
        let everything = setup.consumer_node("everything");
        let changes = setup.consumer_node("changes");
        let (all_listener, mut all_events) = RecordingListener::new();
        let (change_listener, mut change_events) = RecordingListener::new();
        subscribe(&setup, &everything, "all", false, vec![EntityKey::wildcard()], all_listener).await;
        subscribe(&setup, &changes, "temps", true, vec![key("temp", 0, 0, 0)], change_listener).await;

        let (publisher_listener, _publish_events) = RecordingListener::new();
        let publisher = setup.publisher(vec![EntityKey::wildcard()], publisher_listener).await;
        let source = setup.provider.uri().clone();
        publisher
            .publish(
                vec![
                    update(&source, UpdateType::Modification, key("temp", 1, 1, 1)),
                    update(&source, UpdateType::Update, key("pressure", 1, 1, 1)),
                ],
                vec![vec![Element::Long(20), Element::Long(5)]],
            )
            .await
            .unwrap();

        let all = single_update(&all_events.next().await);
        assert_eq!(all.update_headers.len(), 2);
        assert_eq!(all.value_lists, vec![vec![Element::Long(20), Element::Long(5)]]);

        let changed = single_update(&change_events.next().await);
        assert_eq!(changed.update_headers.len(), 1);
        assert_eq!(changed.update_headers[0].key, key("temp", 1, 1, 1));
        assert_eq!(changed.value_lists, vec![vec![Element::Long(20)]]);

        let broker = setup.broker.clone();
        eventually(|| broker.metrics().notifies_sent == 2).await;
    }

    #[tokio::test]
    async fn test_unmatched_update_sends_nothing() {
        let setup = Setup::new();
        let consumer = setup.consumer_node("watcher");
        let (listener, mut events) = RecordingListener::new();
        subscribe(&setup, &consumer, "temps", false, vec![key("temp", 0, 0, 0)], listener).await;

        let (publisher_listener, _publish_events) = RecordingListener::new();
        let publisher = setup.publisher(vec![EntityKey::wildcard()], publisher_listener).await;
        let source = setup.provider.uri().clone();
        publisher
            .publish(
                vec![update(&source, UpdateType::Creation, key("pressure", 1, 1, 1))],
                vec![],
            )
            .await
            .unwrap();

        events.assert_quiet(Duration::from_millis(100)).await;
    }

    // =============================================================================
    // CLEANUP
    // =============================================================================

    #[tokio::test]
    async fn test_deregister_removes_consumer_and_source() {
        let setup = Setup::new();
        let consumer = setup.consumer_node("watcher");
        let (listener, _events) = RecordingListener::new();
        subscribe(&setup, &consumer, "all", false, vec![EntityKey::wildcard()], listener).await;
        assert_eq!(setup.engine.source_count(), 1);
        assert!(setup.engine.has_consumer(consumer.uri()));

        consumer
            .consumer(consumer.details(setup.broker.uri().clone()))
            .deregister(&MONITOR, vec![Identifier::from("all")])
            .await
            .unwrap();

        assert!(!setup.engine.has_consumer(consumer.uri()));
        assert_eq!(setup.engine.consumer_count(), 0);
        assert_eq!(setup.engine.source_count(), 0);
    }

    #[tokio::test]
    async fn test_publisher_deregister_drops_rights() {
        let setup = Setup::new();
        let (publisher_listener, _publish_events) = RecordingListener::new();
        let publisher = setup.publisher(vec![EntityKey::wildcard()], publisher_listener).await;
        assert_eq!(setup.engine.provider_count(), 1);

        publisher.deregister().await.unwrap();

        assert!(!publisher.is_registered());
        assert_eq!(setup.engine.provider_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_consumer_is_dropped() {
        let setup = Setup::new();
        let stays = setup.consumer_node("stays");
        let leaves = setup.consumer_node("leaves");
        let (stay_listener, mut stay_events) = RecordingListener::new();
        let (leave_listener, _leave_events) = RecordingListener::new();
        subscribe(&setup, &stays, "all", false, vec![EntityKey::wildcard()], stay_listener).await;
        subscribe(&setup, &leaves, "all", false, vec![EntityKey::wildcard()], leave_listener).await;
        let gone: Uri = leaves.uri().clone();
        leaves.close().await.unwrap();

        let (publisher_listener, _publish_events) = RecordingListener::new();
        let publisher = setup.publisher(vec![EntityKey::wildcard()], publisher_listener).await;
        let source = setup.provider.uri().clone();
        publisher
            .publish(
                vec![update(&source, UpdateType::Creation, key("x", 1, 1, 1))],
                vec![],
            )
            .await
            .unwrap();

        // The reachable consumer is still served.
        single_update(&stay_events.next().await);
        let broker = setup.broker.clone();
        eventually(|| broker.metrics().lost_consumers == 1).await;
        assert!(!setup.engine.has_consumer(&gone));
        assert!(setup.engine.has_consumer(stays.uri()));
    }
}
