//! Tollgate - HTTP gateway with in-memory admission control
//!
//! This crate serves a handful of demo endpoints behind a shared rate
//! limiter. The limiter counts requests per key in fixed windows, rejects
//! traffic past the configured limit, and forgets keys that go idle.

pub mod config;
pub mod error;
pub mod gateway;
pub mod ratelimit;
