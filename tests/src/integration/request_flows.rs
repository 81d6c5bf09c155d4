//! # Request Flows
//!
//! SEND, SUBMIT, REQUEST, INVOKE and PROGRESS between a consumer node and a
//! provider node.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use async_trait::async_trait;
    use mal_dispatch::{Consumer, MalRuntime};
    use mal_interaction::InteractionListener;
    use mal_transport::InMemoryTransport;
    use mal_types::{error_numbers, Element, MalError, MalResult, Message, MessageBody};
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Pair {
        transport: Arc<InMemoryTransport>,
        consumer: Arc<MalRuntime>,
        provider: Arc<MalRuntime>,
    }

    fn pair() -> Pair {
        let transport = InMemoryTransport::new();
        let provider = node(&transport, "provider");
        let consumer = node(&transport, "consumer");
        Pair {
            transport,
            consumer,
            provider,
        }
    }

    fn long(value: i64) -> MessageBody {
        MessageBody::single(Element::Long(value))
    }

    /// Answers every REQUEST response with a synchronous follow-up REQUEST.
    struct FollowUp {
        client: Consumer,
        results: mpsc::UnboundedSender<MalResult<MessageBody>>,
    }

    #[async_trait]
    impl InteractionListener for FollowUp {
        async fn request_response_received(&self, message: Message) {
            let Some(Element::Long(value)) = message.body.get(0).cloned() else {
                return;
            };
            let result = self.client.request(&ECHO, long(value + 1)).await;
            let _ = self.results.send(result);
        }
    }

    // =============================================================================
    // SEND / SUBMIT / REQUEST
    // =============================================================================

    #[tokio::test]
    async fn test_send_reaches_provider() {
        let nodes = pair();
        let (handler, mut logged) = TestProvider::new();
        nodes.provider.register_provider(AREA, SERVICE, VERSION, handler);

        let client = nodes.consumer.consumer(nodes.consumer.details(nodes.provider.uri().clone()));
        client.send(&LOG, MessageBody::single("hello")).await.unwrap();

        let body = tokio::time::timeout(EVENT_TIMEOUT, logged.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body.get(0), Some(&Element::String("hello".into())));
        // SEND is never tracked.
        assert_eq!(nodes.consumer.registry().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_ack_and_provider_error() {
        let nodes = pair();
        let (handler, _logged) = TestProvider::new();
        nodes.provider.register_provider(AREA, SERVICE, VERSION, handler);
        let client = nodes.consumer.consumer(nodes.consumer.details(nodes.provider.uri().clone()));

        client.submit(&STORE, long(1)).await.unwrap();

        let err = client
            .submit(&STORE, MessageBody::single(Element::Null))
            .await
            .unwrap_err();
        assert_eq!(err.number(), STORE_REJECTED);
        assert_eq!(nodes.consumer.registry().pending_count(), 0);
    }

    /// waitForResult yields the REQUEST_RESPONSE body and the transaction is
    /// gone afterwards.
    #[tokio::test]
    async fn test_sync_request_round_trip_removes_transaction() {
        let nodes = pair();
        let (handler, _logged) = TestProvider::new();
        nodes.provider.register_provider(AREA, SERVICE, VERSION, handler);
        let client = nodes.consumer.consumer(nodes.consumer.details(nodes.provider.uri().clone()));

        let body = MessageBody::new(vec![Element::Long(7), Element::String("x".into())]);
        let reply = client.request(&ECHO, body.clone()).await.unwrap();

        assert_eq!(reply, body);
        assert_eq!(nodes.consumer.registry().pending_count(), 0);
        assert_eq!(
            nodes.consumer.registry().stats().total_completed.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_async_requests_get_distinct_ids() {
        let nodes = pair();
        let (handler, _logged) = TestProvider::new();
        nodes.provider.register_provider(AREA, SERVICE, VERSION, handler);
        let client = nodes.consumer.consumer(nodes.consumer.details(nodes.provider.uri().clone()));
        let (listener, mut events) = RecordingListener::new();

        let mut ids = HashSet::new();
        for i in 0..50 {
            let id = client.async_request(&ECHO, long(i), listener.clone()).await.unwrap();
            ids.insert(id);
        }
        assert_eq!(ids.len(), 50);

        let mut answered = HashSet::new();
        for _ in 0..50 {
            let event = events.next().await;
            assert_eq!(event.kind, "request_response");
            answered.insert(event.message.header.transaction_id.unwrap());
        }
        assert_eq!(answered, ids);
        assert_eq!(nodes.consumer.registry().pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listener_can_make_nested_sync_request() {
        let nodes = pair();
        let (handler, _logged) = TestProvider::new();
        nodes.provider.register_provider(AREA, SERVICE, VERSION, handler);
        let details = nodes.consumer.details(nodes.provider.uri().clone());
        let (results_tx, mut results) = mpsc::unbounded_channel();
        let listener = Arc::new(FollowUp {
            client: nodes.consumer.consumer(details.clone()),
            results: results_tx,
        });

        let client = nodes.consumer.consumer(details);
        client.async_request(&ECHO, long(1), listener).await.unwrap();

        let nested = tokio::time::timeout(EVENT_TIMEOUT, results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(nested.unwrap(), long(2));
        assert_eq!(nodes.consumer.metrics().sync_timeouts, 0);
        assert_eq!(nodes.consumer.registry().pending_count(), 0);
    }

    // =============================================================================
    // INVOKE / PROGRESS
    // =============================================================================

    #[tokio::test]
    async fn test_sync_invoke_returns_ack_then_response_to_listener() {
        let nodes = pair();
        let (handler, _logged) = TestProvider::new();
        nodes.provider.register_provider(AREA, SERVICE, VERSION, handler);
        let client = nodes.consumer.consumer(nodes.consumer.details(nodes.provider.uri().clone()));
        let (listener, mut events) = RecordingListener::new();

        let ack = client.invoke(&COMPUTE, long(21), listener).await.unwrap();
        assert_eq!(ack.get(0), Some(&Element::Boolean(true)));

        let event = events.next().await;
        assert_eq!(event.kind, "invoke_response");
        assert_eq!(event.message.body.get(0), Some(&Element::Long(42)));
        events.assert_quiet(Duration::from_millis(50)).await;
        assert_eq!(nodes.consumer.registry().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_async_invoke_delivers_every_stage() {
        let nodes = pair();
        let (handler, _logged) = TestProvider::new();
        nodes.provider.register_provider(AREA, SERVICE, VERSION, handler);
        let client = nodes.consumer.consumer(nodes.consumer.details(nodes.provider.uri().clone()));
        let (listener, mut events) = RecordingListener::new();

        let id = client.async_invoke(&COMPUTE, long(5), listener).await.unwrap();

        let ack = events.next().await;
        let response = events.next().await;
        assert_eq!(ack.kind, "invoke_ack");
        assert_eq!(response.kind, "invoke_response");
        assert_eq!(response.message.header.transaction_id, Some(id));
        assert_eq!(response.message.body.get(0), Some(&Element::Long(10)));
    }

    #[tokio::test]
    async fn test_progress_updates_arrive_in_order() {
        let nodes = pair();
        let (handler, _logged) = TestProvider::new();
        nodes.provider.register_provider(AREA, SERVICE, VERSION, handler);
        let client = nodes.consumer.consumer(nodes.consumer.details(nodes.provider.uri().clone()));
        let (listener, mut events) = RecordingListener::new();

        client.progress(&COUNT, long(3), listener).await.unwrap();

        for expected in 0..3 {
            let event = events.next().await;
            assert_eq!(event.kind, "progress_update");
            assert_eq!(event.message.body.get(0), Some(&Element::Long(expected)));
        }
        let last = events.next().await;
        assert_eq!(last.kind, "progress_response");
        assert_eq!(last.message.body.get(0), Some(&Element::Long(3)));
        assert_eq!(nodes.consumer.registry().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unimplemented_operation_is_unsupported() {
        let nodes = pair();
        nodes
            .provider
            .register_provider(AREA, SERVICE, VERSION, Arc::new(SilentProvider));
        let client = nodes.consumer.consumer(nodes.consumer.details(nodes.provider.uri().clone()));
        let (listener, _events) = RecordingListener::new();

        let err = client.progress(&COUNT, long(1), listener).await.unwrap_err();
        assert_eq!(err.number(), error_numbers::UNSUPPORTED_OPERATION);
    }

    // =============================================================================
    // FAILURES
    // =============================================================================

    #[tokio::test]
    async fn test_unknown_service_is_destination_unknown() {
        let nodes = pair();
        let (handler, _logged) = TestProvider::new();
        nodes.provider.register_provider(AREA, SERVICE, VERSION, handler);
        let client = nodes.consumer.consumer(nodes.consumer.details(nodes.provider.uri().clone()));

        let err = client.submit(&PURGE, MessageBody::empty()).await.unwrap_err();
        assert_eq!(err.number(), error_numbers::DESTINATION_UNKNOWN);
    }

    #[tokio::test]
    async fn test_unbound_provider_fails_send() {
        let nodes = pair();
        let client = nodes.consumer.consumer(nodes.consumer.details("malmem://nobody"));

        let err = client.request(&ECHO, MessageBody::empty()).await.unwrap_err();
        assert!(matches!(err, MalError::Transport(_)));
        // The transaction created before the send is cancelled.
        assert_eq!(nodes.consumer.registry().pending_count(), 0);
        assert_eq!(nodes.consumer.metrics().send_failures, 1);
    }

    #[tokio::test]
    async fn test_sync_wait_times_out() {
        let transport = InMemoryTransport::new();
        let provider = node(&transport, "slow");
        let mut config = test_config();
        config.sync_timeout = Some(Duration::from_millis(100));
        let consumer = node_with_config(&transport, "impatient", config);
        provider.register_provider(AREA, SERVICE, VERSION, Arc::new(SilentProvider));

        let client = consumer.consumer(consumer.details(provider.uri().clone()));
        let err = client.request(&ECHO, MessageBody::empty()).await.unwrap_err();

        assert!(matches!(err, MalError::DeliveryTimedOut(_)));
        assert_eq!(consumer.registry().pending_count(), 0);
        assert_eq!(consumer.metrics().sync_timeouts, 1);
    }
}
