//! # Provbank Node Coordination
//!
//! Control plane between one coordinating node and N sensor-emitting nodes,
//! carried over TCP with newline-delimited JSON frames — a reliable ordered
//! channel kept strictly apart from the data-plane traffic under test.
//!
//! Registration doubles as clock synchronization: the coordinator runs a
//! round-trip probe against every registering node and hands the estimated
//! offset back, so both sides can place the synchronized start instant and
//! the metrics aggregator can correct cross-node timestamps.

pub mod coordinator;
pub mod error;
pub mod framing;
pub mod messages;
pub mod node;

pub use coordinator::{Coordinator, RegisteredNode, ReportCollector};
pub use error::CoordinationError;
pub use framing::{Channel, ChannelReader, ChannelWriter};
pub use messages::ControlMessage;
pub use node::NodeSession;
