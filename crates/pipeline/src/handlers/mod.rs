//! Topic handlers.

mod notice;
mod payment;
mod sales;

pub use notice::NoticeHandler;
pub use payment::PaymentHandler;
pub use sales::SalesHandler;

use std::sync::Arc;

use store::Store;

use crate::handler::MessageHandler;
use crate::services::{Notifier, PaymentGateway};

/// Builds the payment, sales and notice handlers over one store.
pub fn fulfillment_handlers<S, G, N>(
    store: S,
    gateway: G,
    notifier: N,
) -> Vec<Arc<dyn MessageHandler>>
where
    S: Store + Clone + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    vec![
        Arc::new(PaymentHandler::new(store.clone(), gateway)),
        Arc::new(SalesHandler::new(store.clone())),
        Arc::new(NoticeHandler::new(store, notifier)),
    ]
}
