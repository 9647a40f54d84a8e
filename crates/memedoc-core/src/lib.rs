//! # MemeDoc Core
//!
//! Runtime-agnostic logic for MemeDoc: the content and fingerprint data
//! model, fingerprint similarity, the cross-source pattern engine, and the
//! fingerprint store abstraction with an in-memory implementation.
//!
//! This crate contains no tokio, sqlx, HTTP, or image decoding. The
//! `memedoc` crate supplies those around it.

pub mod fingerprint;
pub mod models;
pub mod patterns;
pub mod store;
