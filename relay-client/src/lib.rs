// relay-client/src/lib.rs
pub mod error;
pub mod machine;
pub mod manager;

pub use error::ClientError;
pub use machine::{Action, ConnectionState, Event, ReconnectMachine, ReconnectPolicy};
pub use manager::ConnectionManager;
