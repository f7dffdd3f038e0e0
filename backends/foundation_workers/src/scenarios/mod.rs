mod bounded;
mod dispatch;
mod rendezvous;

pub use bounded::{run_bounded, BoundedConfig, BoundedReport};
pub use dispatch::{run_dispatch_ack, DispatchAckConfig, DispatchAckReport};
pub use rendezvous::{run_rendezvous, RendezvousConfig, RendezvousReport};
