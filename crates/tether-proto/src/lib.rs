//! Wire types for the Tether sync server.
//!
//! This crate defines the shapes that cross the network: record keys, store
//! requests, change notifications, and the tagged frames of the WebSocket
//! protocol.

pub mod error;
pub mod key;
pub mod message;
pub mod notification;
pub mod request;

pub use error::{ErrorKind, ProtoError};
pub use key::Key;
pub use message::{ClientMessage, ServerMessage};
pub use notification::{ChangeAction, Notification};
pub use request::{
    Operation, Parameters, Record, Relation, RelationKind, StoreRequest, DEFAULT_PRIMARY_KEY,
};
