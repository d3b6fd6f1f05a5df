//! Blocking client for the Voltalis home-energy web API.
//!
//! - [`client`] authenticates and issues requests (cookie and bearer generations).
//! - [`models`] holds the typed records and their JSON codec.
//! - [`queries`] derives memoized, typed lookups from the raw listing calls.
//! - [`services`] assembles write payloads (on/off switching, the all-eco workflow).

pub mod models {
    pub mod codec;
    pub mod token;
    pub mod voltalis;
}

pub mod client;
pub mod config;
pub mod queries;
pub mod transport;
pub mod utils;
pub mod services {
    pub mod eco;
    pub mod switch;
}

pub use client::{ClientBuilder, ClientError, Credentials, RawResponse, VoltalisClient};
pub use queries::{CachePolicy, Queries};
