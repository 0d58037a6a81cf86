//! # Provbank Protocol Plugins
//!
//! The polymorphic contract every protocol-under-test implements, plus the
//! implementations the bench ships with: an in-memory loopback (testing), a
//! UDP reference plugin, and a subprocess wrapper for natively compiled
//! protocol binaries.

pub mod error;
pub mod loopback;
pub mod plugin;
pub mod subprocess;
pub mod udp;

pub use error::ProtocolError;
pub use loopback::LoopbackPlugin;
pub use plugin::{ClientHandle, ProtocolPlugin, SendAck, ServerHandle};
pub use subprocess::SubprocessPlugin;
pub use udp::UdpPlugin;
