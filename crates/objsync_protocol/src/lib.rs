//! # objsync Protocol
//!
//! Shared protocol types for the objsync synchronization service.
//!
//! This crate provides:
//! - `MetaData` describing a synchronized object
//! - `Notification` records tracking per-peer transfer progress
//! - `MessageKind` for the notification messages exchanged between nodes
//! - Node roles, transport protocols, and object statuses
//!
//! This is a pure type crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod meta;
mod notification;

pub use meta::{DeliveryStatus, Destination, MetaData, NodeRole, ObjectStatus, TransportProtocol};
pub use notification::{notification_id, MessageKind, Notification, NotificationStatus};
