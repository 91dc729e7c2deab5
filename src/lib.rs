//! OmniFS: a single-file user-space filesystem exposed over a
//! line-delimited JSON control protocol on a TCP socket.

pub mod bitmap;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod index;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod session;
pub mod tree;
