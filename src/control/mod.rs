//! Local control plane: wire format, daemon-side server and CLI client.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::send_request;
pub use protocol::{Request, Response, ResponseKind};
pub use server::ControlPlane;
