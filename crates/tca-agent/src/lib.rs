//! Conformance-test agent: bridges a Test Manager control socket to a
//! URI-addressed messaging transport.
//!
//! The agent receives JSON commands over one persistent TCP connection,
//! executes them against the transport, and reports synchronous statuses
//! and asynchronous deliveries back over the same socket. See
//! [`session::Session`] for the command set.

pub mod correlator;
pub mod manager;
pub mod registry;
pub mod router;
pub mod session;
pub mod transport;
