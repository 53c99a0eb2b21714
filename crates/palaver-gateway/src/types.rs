//! Wire types for the session proxy

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key/value pairs the vendor extracted from the conversation
pub type Variables = BTreeMap<String, Value>;

/// Response to a create-session request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub id: String,
}

/// Body of a create-session request
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateRequest {
    pub reset_chat: bool,
}

/// Body of a send-message request
#[derive(Debug, Clone, Serialize)]
pub(crate) struct MessageRequest<'a> {
    pub id: &'a str,
    pub message: &'a str,
}

/// Body of an end-session request
#[derive(Debug, Clone, Serialize)]
pub(crate) struct EndRequest<'a> {
    pub id: &'a str,
}
