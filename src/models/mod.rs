//! Request-scoped data carried between handlers and the gateway service.
//!
//! Nothing here is persisted: every value is built for one request and
//! dropped once the response is written.

pub mod object;
pub mod transfer;
