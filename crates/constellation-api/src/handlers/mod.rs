//! HTTP handlers. Peer protocol endpoints live at the root, operator
//! endpoints under `/api`.

pub mod neighbours;
pub mod protocol;
pub mod routing;
pub mod status;

use constellation_services::NodeContext;

#[derive(Clone)]
pub struct ApiState {
    pub node: NodeContext,
}

impl ApiState {
    pub fn new(node: NodeContext) -> Self {
        Self { node }
    }
}

pub use neighbours::{
    handle_blocklist, handle_blocklist_remove, handle_constellation, handle_discovery,
    handle_neighbours,
};
pub use protocol::{handle_forward, handle_handshake, handle_heartbeat, handle_identify, handle_route};
pub use routing::{handle_originate, handle_routes};
pub use status::{handle_churn_trigger, handle_heartbeat_trigger, handle_status};
