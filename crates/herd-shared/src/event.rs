//! Inbound events as produced by the transport adapter.
//!
//! The dispatcher never sees raw transport updates; it consumes these.

use crate::model::{AnimalId, PhotoRef, UserId};

/// Sender identity attached to every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
}

/// Recognized slash commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Menu,
    Enroll,
    List,
    Identify,
}

impl CommandKind {
    /// Parse a message text of the form `/cmd` or `/cmd@BotName args`.
    /// Returns None for plain text and for commands we do not recognize.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let cmd = first.strip_prefix('/')?;
        let cmd = cmd.split('@').next()?;
        match cmd {
            "start" => Some(Self::Start),
            "menu" => Some(Self::Menu),
            "enroll" => Some(Self::Enroll),
            "list" => Some(Self::List),
            "identify" => Some(Self::Identify),
            _ => None,
        }
    }
}

/// Actions carried in inline-keyboard callback payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    Enroll,
    List,
    Identify,
    Remove(AnimalId),
    Missing(AnimalId),
}

impl ButtonAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "enroll" => Some(Self::Enroll),
            "list" => Some(Self::List),
            "identify" => Some(Self::Identify),
            _ => {
                if let Some(id) = data.strip_prefix("remove_") {
                    Some(Self::Remove(id.to_string()))
                } else {
                    data.strip_prefix("missing_")
                        .map(|id| Self::Missing(id.to_string()))
                }
            }
        }
    }

    /// Encode as a callback payload. Inverse of [`ButtonAction::parse`].
    pub fn as_data(&self) -> String {
        match self {
            Self::Enroll => "enroll".to_string(),
            Self::List => "list".to_string(),
            Self::Identify => "identify".to_string(),
            Self::Remove(id) => format!("remove_{}", id),
            Self::Missing(id) => format!("missing_{}", id),
        }
    }
}

/// A single inbound event, already demultiplexed by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Command {
        from: Profile,
        kind: CommandKind,
    },
    Text {
        from: Profile,
        text: String,
    },
    Photo {
        from: Profile,
        photo: PhotoRef,
    },
    Button {
        from: Profile,
        action: String,
        callback_id: String,
    },
}

impl Event {
    pub fn sender(&self) -> &Profile {
        match self {
            Event::Command { from, .. }
            | Event::Text { from, .. }
            | Event::Photo { from, .. }
            | Event::Button { from, .. } => from,
        }
    }
}
