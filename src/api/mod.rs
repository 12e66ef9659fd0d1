//! UQL API client.
//!
//! Provides the call dispatcher, bearer-token helpers, and the envelope
//! types exchanged with the UQL endpoint.

pub mod auth;
pub mod client;
pub mod types;


pub use client::{UqlClient, REQUEST_BODY_FIELD};
pub use types::{
    Attachment, CallError, CallInput, CallOutput, FieldSelection, Fields, Meta, Network, User,
};
