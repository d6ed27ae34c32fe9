//! Client transport for the Freesail gateway.
//!
//! [`ResilientTransport`] keeps a downstream frame stream open, reconnecting
//! with exponential backoff, and queues upstream messages while offline. The
//! network is reached through a [`Connector`]; [`HttpConnector`] speaks the
//! gateway's HTTP interface.

pub mod backoff;
pub mod connector;
pub mod error;
pub mod transport;

pub use backoff::Backoff;
pub use connector::{Connection, Connector, HttpConnector};
pub use error::{Result, TransportError};
pub use transport::{ResilientTransport, SendOutcome, TransportEvent, TransportState};
