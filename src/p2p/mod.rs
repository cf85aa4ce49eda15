//! P2P networking module - Peer ring, wire protocol and flooding overlay

mod overlay;
mod peer;
mod protocol;

pub use overlay::*;
pub use peer::*;
pub use protocol::*;
