//! Webhook payloads exchanged with the chat-transport adapter.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dto::validation::{validate_phone, validate_username};

/// Identity of the chat user an interaction comes from.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate, PartialEq, Eq)]
pub struct Sender {
    /// Chat identifier; also used as the recipient of replies.
    pub chat_id: i64,
    /// Chat handle, with or without the leading `@`.
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    /// Display name.
    #[validate(length(min = 1, max = 128))]
    pub first_name: String,
    /// Phone number shared by the user, used for fee payments.
    #[serde(default)]
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
}

/// How the chat client produced the payload.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Slash command such as `/create_match`.
    Command,
    /// Message typed by the user.
    FreeText,
    /// Option picked from a previous prompt; the payload is the option's `data`.
    Selection,
}

/// One inbound message or callback delivered by the chat-transport adapter.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct InboundInteraction {
    /// Who wrote.
    #[validate(nested)]
    pub sender: Sender,
    /// How `payload` is interpreted.
    pub kind: InteractionKind,
    /// Command, text or option data.
    #[validate(length(max = 4096))]
    pub payload: String,
}

/// Selectable option attached to a prompt.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
pub struct PromptOption {
    /// Button text.
    pub label: String,
    /// Opaque value sent back as a selection payload.
    pub data: String,
}

impl PromptOption {
    /// Option showing `label` and answering with `data`.
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Message the adapter should deliver to `recipient`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
pub struct OutboundPrompt {
    /// Chat to deliver to.
    pub recipient: i64,
    /// Message body.
    pub text: String,
    /// Option rows, rendered as an inline keyboard by the adapter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Vec<PromptOption>>,
}

impl OutboundPrompt {
    /// Plain message without options.
    pub fn text(recipient: i64, text: impl Into<String>) -> Self {
        Self {
            recipient,
            text: text.into(),
            options: Vec::new(),
        }
    }

    /// Attach option rows.
    pub fn with_options(mut self, options: Vec<Vec<PromptOption>>) -> Self {
        self.options = options;
        self
    }
}

/// Replies addressed to the sender of the interaction.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq, Default)]
pub struct InteractionResponse {
    /// Prompts in delivery order.
    pub prompts: Vec<OutboundPrompt>,
}

impl From<Vec<OutboundPrompt>> for InteractionResponse {
    fn from(prompts: Vec<OutboundPrompt>) -> Self {
        Self { prompts }
    }
}
