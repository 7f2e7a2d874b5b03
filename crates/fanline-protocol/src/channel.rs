//! Node-channel naming.
//!
//! Each node owns exactly one inbound pub/sub channel, named from a fixed
//! prefix plus the node's identifier. The prefix keeps node channels in
//! their own namespace on the shared substrate.

/// Prefix for per-node inbound channels.
pub const NODE_CHANNEL_PREFIX: &str = "fanline:node:";

/// Maximum node identifier length.
pub const MAX_NODE_ID_LENGTH: usize = 64;

/// Validate a node identifier.
///
/// # Errors
///
/// Returns an error message if the identifier is invalid.
pub fn validate_node_id(node_id: &str) -> Result<(), &'static str> {
    if node_id.is_empty() {
        return Err("Node id cannot be empty");
    }
    if node_id.len() > MAX_NODE_ID_LENGTH {
        return Err("Node id too long");
    }
    if !node_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err("Node id contains invalid characters");
    }
    Ok(())
}

/// Build the inbound channel name for a node.
#[must_use]
pub fn node_channel(node_id: &str) -> String {
    format!("{NODE_CHANNEL_PREFIX}{node_id}")
}

/// Extract the node id from a channel name, if it is a node channel.
#[must_use]
pub fn parse_node_channel(channel: &str) -> Option<&str> {
    channel
        .strip_prefix(NODE_CHANNEL_PREFIX)
        .filter(|id| validate_node_id(id).is_ok())
}
