//! skkserv: a network dictionary server speaking the SKK protocol.
//!
//! Input-method clients connect over TCP, send short line-oriented
//! requests carrying a reading (midashi), and receive conversion
//! candidates drawn from one or more pre-loaded SKK dictionary files.

pub mod dict;
pub mod encoding;
pub mod server;

pub use dict::{Candidate, Dictionary};
pub use encoding::WireEncoding;
pub use server::Server;
