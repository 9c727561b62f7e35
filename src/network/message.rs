use serde::{Deserialize, Serialize};

use crate::blockchain::Block;

/// Everything nodes say to each other. Announcements go to every peer of
/// the sender; all other variants name a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    BlockAnnouncement {
        from_node_id: String,
        block: Block,
    },
    ChainRequest {
        from_node_id: String,
        to_node_id: String,
    },
    ChainResponse {
        from_node_id: String,
        to_node_id: String,
        blocks: Vec<Block>,
    },
    HeightRequest {
        from_node_id: String,
        to_node_id: String,
    },
    /// `height` is the responder's chain length (tip height + 1).
    HeightResponse {
        from_node_id: String,
        to_node_id: String,
        height: u64,
    },
}

impl Message {
    pub fn sender(&self) -> &str {
        match self {
            Message::BlockAnnouncement { from_node_id, .. }
            | Message::ChainRequest { from_node_id, .. }
            | Message::ChainResponse { from_node_id, .. }
            | Message::HeightRequest { from_node_id, .. }
            | Message::HeightResponse { from_node_id, .. } => from_node_id,
        }
    }

    /// `None` for broadcasts.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Message::BlockAnnouncement { .. } => None,
            Message::ChainRequest { to_node_id, .. }
            | Message::ChainResponse { to_node_id, .. }
            | Message::HeightRequest { to_node_id, .. }
            | Message::HeightResponse { to_node_id, .. } => Some(to_node_id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::BlockAnnouncement { .. } => "block_announcement",
            Message::ChainRequest { .. } => "chain_request",
            Message::ChainResponse { .. } => "chain_response",
            Message::HeightRequest { .. } => "height_request",
            Message::HeightResponse { .. } => "height_response",
        }
    }
}
