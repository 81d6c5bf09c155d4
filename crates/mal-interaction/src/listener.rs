//! # Interaction Listener
//!
//! Callback contract for stages that do not go to a synchronous waiter.
//! Every method defaults to a no-op, so a listener only implements the
//! stages it cares about.
//!
//! Callbacks never run on the endpoint's receive task. Each listener route
//! owns a `ListenerQueue` whose task makes the calls in arrival order, so a
//! callback may itself start a synchronous interaction on the same endpoint.

use async_trait::async_trait;
use mal_types::Message;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Receives the stages of one or more interactions.
#[async_trait]
#[allow(unused_variables)]
pub trait InteractionListener: Send + Sync {
    // SUBMIT
    async fn submit_ack_received(&self, message: Message) {}
    async fn submit_error_received(&self, message: Message) {}

    // REQUEST
    async fn request_response_received(&self, message: Message) {}
    async fn request_error_received(&self, message: Message) {}

    // INVOKE
    async fn invoke_ack_received(&self, message: Message) {}
    async fn invoke_ack_error_received(&self, message: Message) {}
    async fn invoke_response_received(&self, message: Message) {}
    async fn invoke_response_error_received(&self, message: Message) {}

    // PROGRESS
    async fn progress_ack_received(&self, message: Message) {}
    async fn progress_ack_error_received(&self, message: Message) {}
    async fn progress_update_received(&self, message: Message) {}
    async fn progress_update_error_received(&self, message: Message) {}
    async fn progress_response_received(&self, message: Message) {}
    async fn progress_response_error_received(&self, message: Message) {}

    // PUBSUB, consumer side
    async fn register_ack_received(&self, message: Message) {}
    async fn register_error_received(&self, message: Message) {}
    async fn deregister_ack_received(&self, message: Message) {}
    async fn deregister_error_received(&self, message: Message) {}
    async fn notify_received(&self, message: Message) {}
    async fn notify_error_received(&self, message: Message) {}

    // PUBSUB, provider side
    async fn publish_register_ack_received(&self, message: Message) {}
    async fn publish_register_error_received(&self, message: Message) {}
    async fn publish_deregister_ack_received(&self, message: Message) {}
    async fn publish_deregister_error_received(&self, message: Message) {}
    async fn publish_error_received(&self, message: Message) {}
}

/// Listener method selected by a stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerCall {
    SubmitAck,
    SubmitError,
    RequestResponse,
    RequestError,
    InvokeAck,
    InvokeAckError,
    InvokeResponse,
    InvokeResponseError,
    ProgressAck,
    ProgressAckError,
    ProgressUpdate,
    ProgressUpdateError,
    ProgressResponse,
    ProgressResponseError,
    RegisterAck,
    RegisterError,
    DeregisterAck,
    DeregisterError,
    PublishRegisterAck,
    PublishRegisterError,
    PublishDeregisterAck,
    PublishDeregisterError,
    Notify,
    NotifyError,
    PublishError,
}

impl ListenerCall {
    /// Invoke the selected method.
    pub async fn dispatch(self, listener: &Arc<dyn InteractionListener>, message: Message) {
        match self {
            Self::SubmitAck => listener.submit_ack_received(message).await,
            Self::SubmitError => listener.submit_error_received(message).await,
            Self::RequestResponse => listener.request_response_received(message).await,
            Self::RequestError => listener.request_error_received(message).await,
            Self::InvokeAck => listener.invoke_ack_received(message).await,
            Self::InvokeAckError => listener.invoke_ack_error_received(message).await,
            Self::InvokeResponse => listener.invoke_response_received(message).await,
            Self::InvokeResponseError => listener.invoke_response_error_received(message).await,
            Self::ProgressAck => listener.progress_ack_received(message).await,
            Self::ProgressAckError => listener.progress_ack_error_received(message).await,
            Self::ProgressUpdate => listener.progress_update_received(message).await,
            Self::ProgressUpdateError => listener.progress_update_error_received(message).await,
            Self::ProgressResponse => listener.progress_response_received(message).await,
            Self::ProgressResponseError => {
                listener.progress_response_error_received(message).await
            }
            Self::RegisterAck => listener.register_ack_received(message).await,
            Self::RegisterError => listener.register_error_received(message).await,
            Self::DeregisterAck => listener.deregister_ack_received(message).await,
            Self::DeregisterError => listener.deregister_error_received(message).await,
            Self::PublishRegisterAck => listener.publish_register_ack_received(message).await,
            Self::PublishRegisterError => listener.publish_register_error_received(message).await,
            Self::PublishDeregisterAck => listener.publish_deregister_ack_received(message).await,
            Self::PublishDeregisterError => {
                listener.publish_deregister_error_received(message).await
            }
            Self::Notify => listener.notify_received(message).await,
            Self::NotifyError => listener.notify_error_received(message).await,
            Self::PublishError => listener.publish_error_received(message).await,
        }
    }
}

/// Ordered delivery to one listener on its own task.
///
/// The task ends once every clone of the queue is dropped and the calls
/// already pushed have run. Must be spawned inside a tokio runtime.
#[derive(Clone)]
pub struct ListenerQueue {
    tx: mpsc::UnboundedSender<(ListenerCall, Message)>,
}

impl ListenerQueue {
    pub fn spawn(listener: Arc<dyn InteractionListener>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(ListenerCall, Message)>();
        tokio::spawn(async move {
            while let Some((call, message)) = rx.recv().await {
                call.dispatch(&listener, message).await;
            }
        });
        Self { tx }
    }

    /// Queue one call behind those already pushed.
    pub fn push(&self, call: ListenerCall, message: Message) {
        if self.tx.send((call, message)).is_err() {
            debug!(call = ?call, "Listener task gone, call dropped");
        }
    }
}
