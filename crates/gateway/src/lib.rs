//! The platform-facing surface of the metering and dispatch core.
//!
//! `MessagingService` wires the session tracker, quota ledger, admission
//! gate, and dispatch worker together: inbound webhooks call
//! [`MessagingService::on_inbound_message`], the send API calls
//! [`MessagingService::request_send`] or [`MessagingService::send_direct`],
//! and the admin surface uses the quota passthroughs.

pub mod error;
pub mod service;

pub use {
    error::{Error, Result},
    service::{MessagingService, SendOutcome},
};
