//! # Provider Side
//!
//! `ProviderHandler` is implemented by service providers; the runtime hands
//! each received initiation to it together with an `Interaction` through
//! which the provider replies.
//!
//! ## Reply Sequencing
//!
//! | Pattern  | Allowed replies                                  |
//! |----------|--------------------------------------------------|
//! | SEND     | none                                             |
//! | SUBMIT   | ack                                              |
//! | REQUEST  | response                                         |
//! | INVOKE   | ack, then response                               |
//! | PROGRESS | ack, then any number of updates, then response   |
//!
//! An error may replace any pending reply and ends the interaction.
//!
//! Replies are addressed from the transaction source recorded when the
//! initiation arrived. Once that source is retired or purged, further
//! replies fail with `UnknownTransaction` and nothing is sent.

use crate::send::MessageSend;
use async_trait::async_trait;
use mal_interaction::{TransactionRegistry, TransactionSource};
use mal_types::{
    error_numbers, InteractionStage, InteractionType, MalError, MalResult, MessageBody,
    MessageHeader, StandardError, TransactionId,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Service provider callbacks, one per initiating stage.
///
/// Unimplemented patterns answer with UNSUPPORTED_OPERATION.
#[async_trait]
#[allow(unused_variables)]
pub trait ProviderHandler: Send + Sync {
    async fn handle_send(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        Err(unsupported(&interaction))
    }

    async fn handle_submit(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        Err(unsupported(&interaction))
    }

    async fn handle_request(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        Err(unsupported(&interaction))
    }

    async fn handle_invoke(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        Err(unsupported(&interaction))
    }

    async fn handle_progress(&self, interaction: Interaction, body: MessageBody) -> MalResult<()> {
        Err(unsupported(&interaction))
    }
}

fn unsupported(interaction: &Interaction) -> MalError {
    let header = interaction.header();
    MalError::Standard(StandardError::with_text(
        error_numbers::UNSUPPORTED_OPERATION,
        format!(
            "operation {} of service {}.{} does not support {}",
            header.operation, header.service_area, header.service, header.interaction_type
        ),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyState {
    Initiated,
    Acknowledged,
    Finished,
}

struct InteractionInner {
    header: MessageHeader,
    source_id: Option<TransactionId>,
    sender: Arc<MessageSend>,
    registry: Arc<TransactionRegistry>,
    state: Mutex<ReplyState>,
}

/// Provider-side handle on one received interaction.
///
/// Cheap to clone; clones share the reply state.
#[derive(Clone)]
pub struct Interaction {
    inner: Arc<InteractionInner>,
}

impl Interaction {
    /// Track a received initiation as a transaction source. SEND expects no
    /// reply and is not tracked.
    pub fn new(header: MessageHeader, sender: Arc<MessageSend>) -> Self {
        let registry = sender.registry().clone();
        let (source_id, state) = if header.interaction_type == InteractionType::Send {
            (None, ReplyState::Finished)
        } else {
            (
                Some(registry.add_transaction_source(&header)),
                ReplyState::Initiated,
            )
        };

        Self {
            inner: Arc::new(InteractionInner {
                header,
                source_id,
                sender,
                registry,
                state: Mutex::new(state),
            }),
        }
    }

    /// Header of the initiating message.
    pub fn header(&self) -> &MessageHeader {
        &self.inner.header
    }

    pub fn operation(&self) -> u16 {
        self.inner.header.operation
    }

    /// True once a terminal reply has been sent.
    pub fn is_finished(&self) -> bool {
        *self.inner.state.lock() == ReplyState::Finished
    }

    /// SUBMIT_ACK, INVOKE_ACK or PROGRESS_ACK.
    pub async fn send_acknowledgement(&self, body: MessageBody) -> MalResult<()> {
        let (stage, next) = match self.inner.header.interaction_type {
            InteractionType::Submit => (InteractionStage::SUBMIT_ACK, ReplyState::Finished),
            InteractionType::Invoke => (InteractionStage::INVOKE_ACK, ReplyState::Acknowledged),
            InteractionType::Progress => {
                (InteractionStage::PROGRESS_ACK, ReplyState::Acknowledged)
            }
            other => return Err(self.not_allowed("acknowledgement", other)),
        };
        self.advance(ReplyState::Initiated, next, "acknowledgement")?;
        self.reply(stage, body, next == ReplyState::Finished).await
    }

    /// PROGRESS_UPDATE. Only after the ack.
    pub async fn send_update(&self, body: MessageBody) -> MalResult<()> {
        if self.inner.header.interaction_type != InteractionType::Progress {
            return Err(self.not_allowed("update", self.inner.header.interaction_type));
        }
        self.advance(ReplyState::Acknowledged, ReplyState::Acknowledged, "update")?;
        self.reply(InteractionStage::PROGRESS_UPDATE, body, false).await
    }

    /// REQUEST_RESPONSE, INVOKE_RESPONSE or PROGRESS_RESPONSE.
    pub async fn send_response(&self, body: MessageBody) -> MalResult<()> {
        let (stage, required) = match self.inner.header.interaction_type {
            InteractionType::Request => (InteractionStage::REQUEST_RESPONSE, ReplyState::Initiated),
            InteractionType::Invoke => (InteractionStage::INVOKE_RESPONSE, ReplyState::Acknowledged),
            InteractionType::Progress => {
                (InteractionStage::PROGRESS_RESPONSE, ReplyState::Acknowledged)
            }
            other => return Err(self.not_allowed("response", other)),
        };
        self.advance(required, ReplyState::Finished, "response")?;
        self.reply(stage, body, true).await
    }

    /// Error reply at the stage the consumer is waiting on. Ends the
    /// interaction.
    pub async fn send_error(&self, err: &MalError) -> MalResult<()> {
        let stage = {
            let mut state = self.inner.state.lock();
            let stage = error_stage(self.inner.header.interaction_type, *state)
                .ok_or_else(|| self.incorrect("error", *state))?;
            *state = ReplyState::Finished;
            stage
        };

        let source = self.source()?;
        let result = self.inner.sender.return_error(&source.header, stage, err).await;
        self.retire_source();
        result
    }

    /// Where replies go. A missing source ends the interaction.
    fn source(&self) -> MalResult<TransactionSource> {
        let id = self.inner.source_id.ok_or_else(|| {
            MalError::IncorrectState(format!(
                "{} expects no reply",
                self.inner.header.interaction_type
            ))
        })?;
        match self.inner.registry.resolve_transaction_source(id) {
            Some(source) => Ok(source),
            None => {
                *self.inner.state.lock() = ReplyState::Finished;
                warn!(
                    transaction_id = ?self.inner.header.transaction_id,
                    source_id = %id,
                    "Reply for a retired transaction source"
                );
                Err(MalError::UnknownTransaction(id))
            }
        }
    }

    fn advance(&self, required: ReplyState, next: ReplyState, reply: &str) -> MalResult<()> {
        let mut state = self.inner.state.lock();
        if *state != required {
            return Err(self.incorrect(reply, *state));
        }
        *state = next;
        Ok(())
    }

    async fn reply(&self, stage: InteractionStage, body: MessageBody, terminal: bool) -> MalResult<()> {
        let source = self.source()?;
        let result = self
            .inner
            .sender
            .return_response(&source.header, stage, body)
            .await;
        if terminal {
            self.retire_source();
            debug!(
                transaction_id = ?self.inner.header.transaction_id,
                uri = %self.inner.header.uri_from,
                "Provider interaction finished"
            );
        }
        result
    }

    fn retire_source(&self) {
        if let Some(id) = self.inner.source_id {
            self.inner.registry.remove_transaction_source(id);
        }
    }

    fn not_allowed(&self, reply: &str, interaction_type: InteractionType) -> MalError {
        MalError::IncorrectState(format!("{} has no {} stage", interaction_type, reply))
    }

    fn incorrect(&self, reply: &str, state: ReplyState) -> MalError {
        warn!(
            transaction_id = ?self.inner.header.transaction_id,
            state = ?state,
            reply = reply,
            "Provider reply out of sequence"
        );
        MalError::IncorrectState(format!(
            "cannot send {} for {} in state {:?}",
            reply, self.inner.header.interaction_type, state
        ))
    }
}

fn error_stage(interaction_type: InteractionType, state: ReplyState) -> Option<InteractionStage> {
    match (interaction_type, state) {
        (_, ReplyState::Finished) | (InteractionType::Send, _) | (InteractionType::PubSub, _) => None,
        (InteractionType::Submit, _) => Some(InteractionStage::SUBMIT_ACK),
        (InteractionType::Request, _) => Some(InteractionStage::REQUEST_RESPONSE),
        (InteractionType::Invoke, ReplyState::Initiated) => Some(InteractionStage::INVOKE_ACK),
        (InteractionType::Invoke, ReplyState::Acknowledged) => {
            Some(InteractionStage::INVOKE_RESPONSE)
        }
        (InteractionType::Progress, ReplyState::Initiated) => Some(InteractionStage::PROGRESS_ACK),
        (InteractionType::Progress, ReplyState::Acknowledged) => {
            Some(InteractionStage::PROGRESS_RESPONSE)
        }
    }
}

/// Run a provider handler on one received initiation.
///
/// A handler error is returned to the consumer unless the handler already
/// finished the interaction.
pub(crate) async fn run_handler(
    handler: Arc<dyn ProviderHandler>,
    interaction: Interaction,
    body: MessageBody,
) {
    let result = match interaction.header().interaction_type {
        InteractionType::Send => handler.handle_send(interaction.clone(), body).await,
        InteractionType::Submit => handler.handle_submit(interaction.clone(), body).await,
        InteractionType::Request => handler.handle_request(interaction.clone(), body).await,
        InteractionType::Invoke => handler.handle_invoke(interaction.clone(), body).await,
        InteractionType::Progress => handler.handle_progress(interaction.clone(), body).await,
        InteractionType::PubSub => Err(MalError::IncorrectState(
            "PUBSUB is handled by the broker binding".to_string(),
        )),
    };

    let Err(err) = result else {
        return;
    };

    if interaction.is_finished() {
        warn!(
            transaction_id = ?interaction.header().transaction_id,
            error = %err,
            "Provider handler failed after finishing the interaction"
        );
        return;
    }

    if let Err(send_err) = interaction.send_error(&err).await {
        warn!(
            transaction_id = ?interaction.header().transaction_id,
            error = %send_err,
            "Could not return provider error"
        );
    }
}
