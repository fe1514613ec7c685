//! secops - a local security-operations core
//!
//! This crate provides:
//! - Key lifecycle and authenticated encryption (AES-256-GCM, AES-256-CBC, ChaCha20-Poly1305)
//! - Circuit breakers for unreliable external services
//! - Rule-based threat detection and event correlation
//! - A hash-chained audit trail with compliance reports and CSV export
//! - Security alerts with cooldown, auto-resolution and a dashboard view
//!
//! [`SecurityCore`] wires one instance of each together.

pub mod alerting;
pub mod breaker;
pub mod cli;
pub mod compliance;
pub mod config;
pub mod crypto;
pub mod detection;
pub mod paths;
pub mod service;

pub use config::Config;
pub use service::{EventOutcome, SecurityCore};
