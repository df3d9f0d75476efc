//! Integration tests for the Relaygate gateway
//!
//! Each test drives the real router with `axum-test` against a wiremock
//! upstream.

mod bedrock;
mod errors;
mod health;
mod uploads;
