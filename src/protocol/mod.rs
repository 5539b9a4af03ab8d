//! Protocol Module
//!
//! Defines the wire protocol for client-server communication: an
//! already-parsed [`Command`] and its [`Response`], each framed as a 4-byte
//! little-endian length prefix followed by a `bincode` payload.
//!
//! ```text
//! ┌──────────┬─────────────────────────────┐
//! │ Len (4)  │         bincode payload      │
//! └──────────┴─────────────────────────────┘
//! ```
//!
//! Turning a query-language string into a `Command` is an external
//! collaborator's job (the surface grammar's lexical details are out of
//! scope here); this module only carries the already-structured form.

mod command;
mod response;
mod codec;

pub use command::Command;
pub use response::Response;
pub use codec::{decode_command, decode_response, encode_command, encode_response, frame_len};
