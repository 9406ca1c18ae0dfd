//! Order placement, payment requests, lookup and cancellation.

mod input;
mod service;

pub use input::{CreateOrderInput, OrderDetails, OrderItemInput, OrderReceipt, PaymentRequest};
pub use service::OrderService;
