use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile mirror as supplied by the external directory. The core only ever
/// reads role and messaging opt-in, everything else lives outside.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Profile {
    pub id: Uuid,
    pub role: Role,
    pub accepts_messages: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Seeker,
    Offerer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Seeker => "seeker",
            Role::Offerer => "offerer",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "seeker" => Some(Role::Seeker),
            "offerer" => Some(Role::Offerer),
            _ => None,
        }
    }
}

/// Directed interest edge. At most one per ordered pair.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LikeEdge {
    pub liker_id: Uuid,
    pub liked_id: Uuid,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    Inactive,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Active => "active",
            MatchStatus::Inactive => "inactive",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "active" => Some(MatchStatus::Active),
            "inactive" => Some(MatchStatus::Inactive),
            _ => None,
        }
    }
}

/// Canonical-pair match row. Participants are stored low/high by uuid order
/// so an unordered pair has exactly one possible row. Never deleted, only
/// transitioned, so the linked conversation survives an unmatch.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Match {
    pub id: Uuid,
    pub profile_low: Uuid,
    pub profile_high: Uuid,
    pub status: MatchStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Match,
    Inquiry,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Match => "match",
            ConversationKind::Inquiry => "inquiry",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "match" => Some(ConversationKind::Match),
            "inquiry" => Some(ConversationKind::Inquiry),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub kind: ConversationKind,
    pub match_id: Option<Uuid>,
    pub is_active: bool,
    pub last_sequence: i64,
    pub last_message_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::System => "system",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "system" => Some(MessageKind::System),
            _ => None,
        }
    }
}

/// A message inside a conversation. `seq` is assigned by the store, strictly
/// increasing and gap-free per conversation; clients treat it as an opaque
/// cursor. `is_read` is derived from the counterpart's read pointer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub kind: MessageKind,
    pub seq: i64,
    pub created_at: i64,
    pub is_read: bool,
}

/// Derived presence, never stored. `last_seen` is only reported while
/// offline.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Presence {
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
}
