//! Usage metering: cost model, per-call records, the session buffer and the
//! persisted per-interview logs.

pub mod aggregate;
pub mod buffer;
pub mod cost;
pub mod handlers;
pub mod record;
pub mod store;
