//! Who may change a message.
//!
//! Edit: the author, on a live text message. Delete: the author or any
//! MODERATOR/ADMIN of the server, on a live message.

use serde::Serialize;

use crate::types::{Member, Message, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub can_edit: bool,
    pub can_delete: bool,
}

pub fn check(current: &Member, message: &Message) -> Permissions {
    Permissions {
        can_edit: can_edit(current, message),
        can_delete: can_delete(current, message),
    }
}

/// Attachment messages carry the file reference as content and stay as sent.
pub fn can_edit(current: &Member, message: &Message) -> bool {
    !message.deleted && is_author(current, message) && message.file_url.is_none()
}

pub fn can_delete(current: &Member, message: &Message) -> bool {
    !message.deleted && (is_author(current, message) || current.role.at_least(Role::Moderator))
}

/// Creating and deleting channels is staff-only.
pub fn can_manage_channels(current: &Member) -> bool {
    current.role.at_least(Role::Moderator)
}

fn is_author(current: &Member, message: &Message) -> bool {
    current.id == message.author_member_id
}
