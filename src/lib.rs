//! nsca-push - a passive-monitoring check submission client.
//!
//! Implements the client side of the NSCA wire protocol: connect, receive
//! the server-pushed init packet (IV + timestamp), derive a symmetric
//! encryption context, and submit one or more encrypted check-result
//! packets over the same connection.
//!
//! The pieces fit together as follows:
//!
//! - [`protocol`]: the pull-based handshake state machine that decides
//!   which half-duplex operation is legal next.
//! - [`timed_stream`]: deadline-raced single reads/writes used by the
//!   driver for every suspension point.
//! - [`allowed_hosts`]: CIDR-style allow-list matching for accept paths,
//!   with lazy hostname re-resolution.
//! - [`client`]: the connection driver tying protocol and timed I/O
//!   together.
//! - [`packet`], [`crypto`], [`crc32`]: the wire codec and encryption
//!   collaborators.

pub mod address;
pub mod allowed_hosts;
pub mod client;
pub mod config;
pub mod crc32;
pub mod crypto;
pub mod packet;
pub mod protocol;
pub mod resolver;
pub mod timed_stream;
