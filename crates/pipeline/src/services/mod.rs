//! External services the handlers call out to.

pub mod notification;
pub mod payment;

pub use notification::{Notifier, SimulatedNotifier};
pub use payment::{PaymentConfirmation, PaymentGateway, SimulatedPaymentGateway};
