//! # objsync Notifier
//!
//! The notification-handling core of the objsync synchronization service.
//!
//! Two node roles exchange objects identified by `(org, type, id)` plus a
//! monotonically increasing instance id: a central sync service (CSS) and
//! edge sync services (ESS). For every (object, peer) pair this crate
//! drives a notification record through update / data-transfer / consume /
//! delete message exchanges until terminal acknowledgement.
//!
//! The crate provides:
//! - [`NotificationHandler`] — one entry point per inbound event kind,
//!   safe to call from parallel transport worker threads
//! - Chunked data transfer with a configurable in-flight window,
//!   bitmap-based received tracking, and per-chunk retransmission deadlines
//! - The resend planner driven by an external periodic caller
//! - The [`Communicator`], [`LeaderElection`], [`DataUriSink`], and
//!   [`WebhookSink`] traits through which transports and other
//!   collaborators are consumed, with mock implementations for testing
//!
//! Storage is consumed through [`objsync_store::SyncStore`]; the data-chunk
//! wire format lives in [`objsync_codec`].
//!
//! Handlers block on store and transport calls; the service dispatches each
//! inbound event on a worker thread and runs it to completion. Mutations
//! for a given object are serialized internally by a fixed array of
//! per-object locks, so duplicate and out-of-order deliveries reduce to
//! instance-id and status checks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunks;
mod config;
mod error;
mod handler;
mod locks;
mod resend;
mod services;
mod transport;

pub use config::NotifierConfig;
pub use error::{NotifierError, NotifierResult};
pub use handler::NotificationHandler;
pub use services::{
    DataUriSink, FixedLeader, LeaderElection, MemoryDataUri, NoDataUri, NoWebhooks,
    RecordingWebhooks, WebhookSink,
};
pub use transport::{Communicator, MockCommunicator, SentMessage};
