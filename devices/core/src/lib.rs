//! Core traits and types for stu-sync device drivers.
//!
//! This crate provides:
//! - The transport capability (`HidBackend`, `HidHandle`) a host platform implements
//! - `DeviceIdentity` for discovery filtering
//! - `Subscribers`, an ordered observer registry for asynchronous device events

mod subscribers;
mod transport;

pub use subscribers::{Subscribers, SubscriptionId};
pub use transport::{
    with_timeout, DeviceIdentity, HidBackend, HidHandle, InputReportHandler, Result,
    TransportError,
};
