//! The native protocol spoken between a client and a columnar analytical database server.
//!
//! A session opens with a [`Request::Hello`] answered by the server's [`ServerInfo`]. Both
//! sides then encode for the lower of the two revisions they announced (see [`revision`]).
//! Each query is a [`Request::Query`] followed by an empty [`Request::Data`] block, after
//! which the server streams [`ServerResponse`]s until end of stream or an exception.
//!
//! [`ProtocolClient`] drives that exchange over any blocking `Read + Write` stream.

pub use client::*;
pub use config::*;
pub use request::*;
pub use response::*;
pub use settings::*;

mod client;
mod config;
mod request;
mod response;
pub mod revision;
mod settings;
