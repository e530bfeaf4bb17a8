//! Asynchronous event delivery
//!
//! The request path pushes events into a bounded [`EventQueue`] without
//! ever waiting; a single [`DeliveryWorker`] drains it, resolves the
//! destination website and submits each event to the collector.

pub mod queue;
pub mod worker;

pub use queue::EventQueue;
pub use worker::{DeliveryError, DeliveryWorker, Session};
