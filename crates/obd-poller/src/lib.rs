//! Background polling of an ELM327 adapter
//!
//! An [`ObdSession`] connects, runs the handshake and spawns a task that
//! sweeps the parameter table into a shared [`ReadingStore`]. Consumers
//! drain the store with [`ObdSession::read_snapshot`].

mod config;
mod error;
mod poller;
mod session;
mod store;

pub use config::SessionConfig;
pub use error::SessionError;
pub use poller::{retrieve_vin, PollHandle, Poller};
pub use session::ObdSession;
pub use store::{ConnectionState, ReadingStore, Snapshot};
