//! # Stage Sequencing
//!
//! Stages that arrive out of order, for unknown transactions, or with no
//! route at all are rejected at the receiving node without disturbing the
//! interactions already in flight.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use mal_dispatch::MalRuntime;
    use mal_interaction::InteractionPattern;
    use mal_transport::InMemoryTransport;
    use mal_types::{
        Element, InteractionStage, MalError, Message, MessageBody, MessageHeader, Operation,
        TransactionId, Uri,
    };
    use std::sync::Arc;
    use std::time::Duration;

    /// A stage message as `provider` would send it to `consumer`.
    fn stage_from(
        consumer: &MalRuntime,
        provider: &Uri,
        operation: &Operation,
        stage: InteractionStage,
        id: TransactionId,
    ) -> Message {
        let mut header: MessageHeader =
            consumer
                .details(provider.clone())
                .header(operation, Some(stage), Some(id));
        header.uri_from = provider.clone();
        header.uri_to = consumer.uri().clone();
        Message::new(header, MessageBody::single(Element::Long(1)))
    }

    fn setup() -> (Arc<InMemoryTransport>, Arc<MalRuntime>, Uri) {
        let transport = InMemoryTransport::new();
        let consumer = node(&transport, "consumer");
        let provider = Uri::new("malmem://provider");
        (transport, consumer, provider)
    }

    #[tokio::test]
    async fn test_response_before_ack_rejected_for_listener() {
        let (transport, consumer, provider) = setup();
        let (listener, mut events) = RecordingListener::new();
        let id = consumer
            .registry()
            .create_transaction(InteractionPattern::Invoke, false, Some(listener));

        let early = stage_from(&consumer, &provider, &COMPUTE, InteractionStage::INVOKE_RESPONSE, id);
        let err = consumer.receive(early).await.unwrap_err();

        assert!(matches!(err, MalError::UnexpectedStage { transaction_id, .. } if transaction_id == id));
        assert!(consumer.registry().is_pending(id));
        events.assert_quiet(Duration::from_millis(50)).await;

        // The interaction carries on normally afterwards.
        let ack = stage_from(&consumer, &provider, &COMPUTE, InteractionStage::INVOKE_ACK, id);
        let response = stage_from(&consumer, &provider, &COMPUTE, InteractionStage::INVOKE_RESPONSE, id);
        consumer.receive(ack).await.unwrap();
        consumer.receive(response).await.unwrap();

        assert_eq!(events.next().await.kind, "invoke_ack");
        assert_eq!(events.next().await.kind, "invoke_response");
        assert!(!consumer.registry().is_pending(id));
    }

    #[tokio::test]
    async fn test_response_before_ack_does_not_release_waiter() {
        let (transport, consumer, provider) = setup();
        let id = consumer
            .registry()
            .create_transaction(InteractionPattern::Invoke, true, None);

        let registry = consumer.registry().clone();
        let waiter = tokio::spawn(async move { registry.wait_for_result(id).await });

        let early = stage_from(&consumer, &provider, &COMPUTE, InteractionStage::INVOKE_RESPONSE, id);
        assert!(consumer.receive(early).await.is_err());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        let ack = stage_from(&consumer, &provider, &COMPUTE, InteractionStage::INVOKE_ACK, id);
        consumer.receive(ack).await.unwrap();

        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result.header.interaction_stage, Some(InteractionStage::INVOKE_ACK));
    }

    #[tokio::test]
    async fn test_stage_for_unknown_transaction() {
        let (transport, consumer, provider) = setup();
        let stray = stage_from(
            &consumer,
            &provider,
            &ECHO,
            InteractionStage::REQUEST_RESPONSE,
            TransactionId::from(9_999),
        );

        assert!(matches!(
            consumer.receive(stray).await,
            Err(MalError::UnknownTransaction(_))
        ));
    }

    #[tokio::test]
    async fn test_undefined_stage_is_unroutable() {
        let (transport, consumer, provider) = setup();
        let bogus = stage_from(
            &consumer,
            &provider,
            &STORE,
            InteractionStage::new(3),
            TransactionId::from(1),
        );

        assert!(matches!(
            consumer.receive(bogus).await,
            Err(MalError::UnroutableStage { .. })
        ));
    }
}
