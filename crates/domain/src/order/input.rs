use common::{AddressId, Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use store::{NewLineItem, NewOrder, Order, OrderLineItem, PaymentStatus};

use crate::error::{DomainError, Result};

/// One requested product line of a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemInput {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl OrderItemInput {
    pub fn new(product_id: u64, quantity: i64) -> Self {
        Self {
            product_id: ProductId::new(product_id),
            quantity,
        }
    }
}

/// Input for placing an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderInput {
    pub user_id: UserId,
    pub total_price: Money,
    /// Shipping address. The user's default address is used when absent.
    #[serde(default)]
    pub address_id: Option<AddressId>,
    pub items: Vec<OrderItemInput>,
}

impl CreateOrderInput {
    /// Checks the input and converts it into a store insert.
    pub(crate) fn validate(&self) -> Result<Vec<NewLineItem>> {
        if self.user_id.is_zero() {
            return Err(DomainError::validation("user_id", "must be non-zero"));
        }
        if !self.total_price.is_positive() {
            return Err(DomainError::validation(
                "total_price",
                format!("must be positive, got {}", self.total_price),
            ));
        }
        if self.items.is_empty() {
            return Err(DomainError::validation("items", "order has no items"));
        }

        self.items
            .iter()
            .map(|item| {
                if item.product_id.is_zero() {
                    return Err(DomainError::validation("product_id", "must be non-zero"));
                }
                // Line quantities are stored as a 32-bit signed column.
                let quantity = i32::try_from(item.quantity)
                    .ok()
                    .filter(|q| *q > 0)
                    .and_then(|q| u32::try_from(q).ok())
                    .ok_or_else(|| {
                        DomainError::validation(
                            "quantity",
                            format!("{} for product {}", item.quantity, item.product_id),
                        )
                    })?;
                Ok(NewLineItem {
                    product_id: item.product_id,
                    quantity,
                })
            })
            .collect()
    }

    pub(crate) fn into_new_order(
        self,
        address_id: AddressId,
        items: Vec<NewLineItem>,
    ) -> NewOrder {
        NewOrder {
            user_id: self.user_id,
            total_price: self.total_price,
            address_id,
            items,
        }
    }
}

/// What the caller gets back after placing an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub total_price: Money,
    pub address_id: AddressId,
}

/// An order together with its line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLineItem>,
}

/// Result of asking for an order to be paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "payment", rename_all = "snake_case")]
pub enum PaymentRequest {
    /// A payment event was published for the unpaid order.
    Submitted,
    /// The order had already left `unpaid`; nothing was published.
    AlreadySettled { payment_status: PaymentStatus },
}
