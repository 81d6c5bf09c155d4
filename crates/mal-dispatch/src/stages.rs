//! Reply-stage rules shared by the send and receive paths.

use mal_types::{InteractionStage, InteractionType, MessageHeader};

/// Stage at which an error reply to `request` is sent.
///
/// `None` when the message cannot be answered with an error (SEND, or a
/// stage that is itself a reply).
pub fn calculate_error_stage(request: &MessageHeader) -> Option<InteractionStage> {
    let stage = request.interaction_stage?;
    match (request.interaction_type, stage) {
        (InteractionType::Submit, InteractionStage::SUBMIT) => Some(InteractionStage::SUBMIT_ACK),
        (InteractionType::Request, InteractionStage::REQUEST) => {
            Some(InteractionStage::REQUEST_RESPONSE)
        }
        (InteractionType::Invoke, InteractionStage::INVOKE) => Some(InteractionStage::INVOKE_ACK),
        (InteractionType::Progress, InteractionStage::PROGRESS) => {
            Some(InteractionStage::PROGRESS_ACK)
        }
        (InteractionType::PubSub, InteractionStage::REGISTER) => {
            Some(InteractionStage::REGISTER_ACK)
        }
        (InteractionType::PubSub, InteractionStage::PUBLISH_REGISTER) => {
            Some(InteractionStage::PUBLISH_REGISTER_ACK)
        }
        (InteractionType::PubSub, InteractionStage::PUBLISH) => Some(InteractionStage::PUBLISH),
        (InteractionType::PubSub, InteractionStage::DEREGISTER) => {
            Some(InteractionStage::DEREGISTER_ACK)
        }
        (InteractionType::PubSub, InteractionStage::PUBLISH_DEREGISTER) => {
            Some(InteractionStage::PUBLISH_DEREGISTER_ACK)
        }
        _ => None,
    }
}

/// True for the stages a provider or broker receives to start an exchange.
pub fn is_initiation(interaction_type: InteractionType, stage: Option<InteractionStage>) -> bool {
    match (interaction_type, stage) {
        (InteractionType::Send, _) => true,
        (_, None) => false,
        (InteractionType::PubSub, Some(stage)) => matches!(
            stage,
            InteractionStage::REGISTER
                | InteractionStage::PUBLISH_REGISTER
                | InteractionStage::PUBLISH
                | InteractionStage::DEREGISTER
                | InteractionStage::PUBLISH_DEREGISTER
        ),
        (_, Some(stage)) => stage == InteractionStage::new(1),
    }
}
