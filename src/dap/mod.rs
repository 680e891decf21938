//! Debug adapter protocol plumbing: framing, TCP transport and message types.

pub mod codec;
pub mod path_map;
pub mod protocol;
pub mod tracer;
pub mod transport;

pub use codec::TransportError;
pub use transport::{DebugTransport, Listener};
