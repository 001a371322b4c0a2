use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::messages::repo_types::Message;
use crate::users::dto::UserView;

/// Body of `POST /messages`.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient: Uuid,
    pub content: String,
}

/// A conversation as returned to the viewing user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub partner: UserView,
    pub last_message: Option<Message>,
    pub unread_count: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}
