//! # doge-tests
//!
//! Integration tests for Dogecoin peer discovery.
//!
//! This crate provides cross-crate testing including:
//! - Wire handshakes against stub peers
//! - Catalog persistence through snapshot files
//! - Property-based tests for catalog invariants and address normalization
//! - Snowball amplification and full orchestrator cycles over real sockets

pub mod generators;
pub mod harness;

#[cfg(test)]
mod handshake_tests;


#[cfg(test)]
mod property_tests;


#[cfg(test)]
mod discovery_tests;

pub use generators::*;
pub use harness::*;
