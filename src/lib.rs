//! Survey Bot — a five-question chat survey with discount verification.

pub mod channels;
pub mod config;
pub mod discount;
pub mod error;
pub mod server;
pub mod survey;
