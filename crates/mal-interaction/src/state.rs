//! # Interaction Pattern State Machines
//!
//! One `InteractionState` per pending transaction and one transition
//! function covering every pattern.
//!
//! | Pattern  | Stages                                         | Finished when            |
//! |----------|------------------------------------------------|--------------------------|
//! | SUBMIT   | SUBMIT → SUBMIT_ACK                            | ack                      |
//! | REQUEST  | REQUEST → REQUEST_RESPONSE                     | response                 |
//! | INVOKE   | INVOKE → ACK → RESPONSE                        | response, or error ack   |
//! | PROGRESS | PROGRESS → ACK → UPDATE* → RESPONSE            | response, or any error   |
//! | PUBSUB   | REGISTER / DEREGISTER / PUBLISH_(DE)REGISTER → ACK | ack                  |
//!
//! A rejected stage leaves the state exactly as it was.

use crate::listener::ListenerCall;
use mal_types::{InteractionStage, InteractionType};

/// What a consumer started. PUBSUB is split by sub-operation because each
/// expects a different ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionPattern {
    Submit,
    Request,
    Invoke,
    Progress,
    Register,
    Deregister,
    PublishRegister,
    PublishDeregister,
}

impl InteractionPattern {
    pub fn interaction_type(self) -> InteractionType {
        match self {
            Self::Submit => InteractionType::Submit,
            Self::Request => InteractionType::Request,
            Self::Invoke => InteractionType::Invoke,
            Self::Progress => InteractionType::Progress,
            Self::Register | Self::Deregister | Self::PublishRegister | Self::PublishDeregister => {
                InteractionType::PubSub
            }
        }
    }

    /// Stage of the message that starts this pattern.
    pub fn initial_stage(self) -> InteractionStage {
        match self {
            Self::Submit => InteractionStage::SUBMIT,
            Self::Request => InteractionStage::REQUEST,
            Self::Invoke => InteractionStage::INVOKE,
            Self::Progress => InteractionStage::PROGRESS,
            Self::Register => InteractionStage::REGISTER,
            Self::Deregister => InteractionStage::DEREGISTER,
            Self::PublishRegister => InteractionStage::PUBLISH_REGISTER,
            Self::PublishDeregister => InteractionStage::PUBLISH_DEREGISTER,
        }
    }

    /// Pattern started by a message of this type and stage.
    pub fn from_initiation(
        interaction_type: InteractionType,
        stage: Option<InteractionStage>,
    ) -> Option<Self> {
        let stage = stage?;
        let pattern = match interaction_type {
            InteractionType::Send => return None,
            InteractionType::Submit => Self::Submit,
            InteractionType::Request => Self::Request,
            InteractionType::Invoke => Self::Invoke,
            InteractionType::Progress => Self::Progress,
            InteractionType::PubSub => match stage {
                InteractionStage::REGISTER => Self::Register,
                InteractionStage::DEREGISTER => Self::Deregister,
                InteractionStage::PUBLISH_REGISTER => Self::PublishRegister,
                InteractionStage::PUBLISH_DEREGISTER => Self::PublishDeregister,
                _ => return None,
            },
        };
        (pattern.initial_stage() == stage).then_some(pattern)
    }
}

/// Pattern progress of a pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Submit,
    /// REQUEST has no separate ack stage.
    Request,
    Invoke { ack_received: bool },
    Progress { ack_received: bool, updates: u32 },
    PubSub { expected_ack: InteractionStage },
}

/// Result of an accepted stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The interaction reached a terminal stage.
    pub finished: bool,
    /// The stage carries a result a synchronous caller is waiting for.
    pub result_bearing: bool,
    /// Listener method for this stage when no waiter takes it.
    pub call: ListenerCall,
}

impl InteractionState {
    /// Starting state for a newly created transaction.
    pub fn initial(pattern: InteractionPattern) -> Self {
        match pattern {
            InteractionPattern::Submit => Self::Submit,
            InteractionPattern::Request => Self::Request,
            InteractionPattern::Invoke => Self::Invoke { ack_received: false },
            InteractionPattern::Progress => Self::Progress {
                ack_received: false,
                updates: 0,
            },
            InteractionPattern::Register => Self::PubSub {
                expected_ack: InteractionStage::REGISTER_ACK,
            },
            InteractionPattern::Deregister => Self::PubSub {
                expected_ack: InteractionStage::DEREGISTER_ACK,
            },
            InteractionPattern::PublishRegister => Self::PubSub {
                expected_ack: InteractionStage::PUBLISH_REGISTER_ACK,
            },
            InteractionPattern::PublishDeregister => Self::PubSub {
                expected_ack: InteractionStage::PUBLISH_DEREGISTER_ACK,
            },
        }
    }

    pub fn interaction_type(&self) -> InteractionType {
        match self {
            Self::Submit => InteractionType::Submit,
            Self::Request => InteractionType::Request,
            Self::Invoke { .. } => InteractionType::Invoke,
            Self::Progress { .. } => InteractionType::Progress,
            Self::PubSub { .. } => InteractionType::PubSub,
        }
    }

    /// Apply an inbound stage.
    ///
    /// Returns `None` when the stage is not valid next, in which case
    /// `self` is unchanged.
    pub fn advance(
        &mut self,
        interaction_type: InteractionType,
        stage: InteractionStage,
        is_error: bool,
    ) -> Option<Transition> {
        if interaction_type != self.interaction_type() {
            return None;
        }

        let pick = |ok: ListenerCall, err: ListenerCall| if is_error { err } else { ok };

        match *self {
            Self::Submit if stage == InteractionStage::SUBMIT_ACK => Some(Transition {
                finished: true,
                result_bearing: true,
                call: pick(ListenerCall::SubmitAck, ListenerCall::SubmitError),
            }),

            Self::Request if stage == InteractionStage::REQUEST_RESPONSE => Some(Transition {
                finished: true,
                result_bearing: true,
                call: pick(ListenerCall::RequestResponse, ListenerCall::RequestError),
            }),

            Self::Invoke { ack_received: false } if stage == InteractionStage::INVOKE_ACK => {
                *self = Self::Invoke { ack_received: true };
                Some(Transition {
                    finished: is_error,
                    result_bearing: true,
                    call: pick(ListenerCall::InvokeAck, ListenerCall::InvokeAckError),
                })
            }
            Self::Invoke { ack_received: true } if stage == InteractionStage::INVOKE_RESPONSE => {
                Some(Transition {
                    finished: true,
                    result_bearing: false,
                    call: pick(ListenerCall::InvokeResponse, ListenerCall::InvokeResponseError),
                })
            }

            Self::Progress {
                ack_received: false,
                ..
            } if stage == InteractionStage::PROGRESS_ACK => {
                *self = Self::Progress {
                    ack_received: true,
                    updates: 0,
                };
                Some(Transition {
                    finished: is_error,
                    result_bearing: true,
                    call: pick(ListenerCall::ProgressAck, ListenerCall::ProgressAckError),
                })
            }
            Self::Progress {
                ack_received: true,
                updates,
            } if stage == InteractionStage::PROGRESS_UPDATE => {
                *self = Self::Progress {
                    ack_received: true,
                    updates: updates.saturating_add(1),
                };
                Some(Transition {
                    finished: is_error,
                    result_bearing: false,
                    call: pick(ListenerCall::ProgressUpdate, ListenerCall::ProgressUpdateError),
                })
            }
            Self::Progress {
                ack_received: true,
                ..
            } if stage == InteractionStage::PROGRESS_RESPONSE => Some(Transition {
                finished: true,
                result_bearing: false,
                call: pick(
                    ListenerCall::ProgressResponse,
                    ListenerCall::ProgressResponseError,
                ),
            }),

            Self::PubSub { expected_ack } if stage == expected_ack => {
                let call = match expected_ack {
                    InteractionStage::REGISTER_ACK => {
                        pick(ListenerCall::RegisterAck, ListenerCall::RegisterError)
                    }
                    InteractionStage::DEREGISTER_ACK => {
                        pick(ListenerCall::DeregisterAck, ListenerCall::DeregisterError)
                    }
                    InteractionStage::PUBLISH_REGISTER_ACK => pick(
                        ListenerCall::PublishRegisterAck,
                        ListenerCall::PublishRegisterError,
                    ),
                    _ => pick(
                        ListenerCall::PublishDeregisterAck,
                        ListenerCall::PublishDeregisterError,
                    ),
                };
                Some(Transition {
                    finished: true,
                    result_bearing: true,
                    call,
                })
            }

            _ => None,
        }
    }
}
