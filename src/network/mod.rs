pub mod message;
pub mod transport;

pub use message::Message;
pub use transport::{Network, ProbeHandle, Topology};
