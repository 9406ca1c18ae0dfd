//! Asynchronous fulfillment pipeline.
//!
//! This crate consumes the payment, sales and notice topics:
//! - [`ConsumerPool`] runs supervised consumer loops per topic
//! - [`BoundedDispatcher`] caps the messages each loop has in flight
//! - The handlers settle payments, count sales and notify customers
//! - [`OutboxRelay`] republishes outbox rows that were never published

pub mod backoff;
pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod outbox;
pub mod services;

pub use backoff::ExponentialBackoff;
pub use config::{BackoffConfig, OutboxConfig, PipelineConfig};
pub use consumer::ConsumerPool;
pub use dispatcher::BoundedDispatcher;
pub use error::{PipelineError, Result};
pub use handler::{HandleOutcome, MessageHandler};
pub use handlers::{NoticeHandler, PaymentHandler, SalesHandler, fulfillment_handlers};
pub use outbox::OutboxRelay;
pub use services::{
    Notifier, PaymentConfirmation, PaymentGateway, SimulatedNotifier, SimulatedPaymentGateway,
};
