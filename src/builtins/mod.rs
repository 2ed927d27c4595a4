//! Service makers shipped with servd.

pub mod echo;
pub mod portforward;

pub use echo::{EchoHandler, EchoMaker, EchoService};
pub use portforward::{ForwardHandler, PortForwardMaker, PortForwardService};
