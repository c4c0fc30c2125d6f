//! Gatekeeper - Distributed Rate Limiting Decision Service
//!
//! This crate implements a rate limiting decision service consulted on every
//! inbound request of a protected service. Decisions are made by a fixed set
//! of admission-control policies (token bucket, leaky bucket, fixed window,
//! sliding window log, sliding window counter, plus allow-all/deny-all escape
//! hatches), each executing its state transition as a single atomic
//! transaction against a shared Redis store.

pub mod config;
pub mod error;
pub mod grpc;
pub mod ratelimit;
pub mod store;
