use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, OrderId, ProductId, UserId};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    CartLine, CartStatus, NewOrder, Order, OrderLineItem, OrderStatus, OutboxMessage,
    PaymentStatus, Product, Result, SalesOutcome, store::Store,
};

#[derive(Debug, Clone)]
struct CartRow {
    cart_id: u64,
    user_id: UserId,
    product_id: ProductId,
    quantity: i64,
    status: CartStatus,
}

#[derive(Debug, Clone)]
struct OutboxRow {
    message: OutboxMessage,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct MemoryState {
    orders: BTreeMap<OrderId, Order>,
    line_items: Vec<OrderLineItem>,
    products: HashMap<ProductId, Product>,
    default_addresses: HashMap<UserId, AddressId>,
    cart: Vec<CartRow>,
    outbox: Vec<OutboxRow>,
    sales_ledger: HashSet<Uuid>,
    next_order_id: u64,
    next_cart_id: u64,
}

/// In-memory primary store for testing.
///
/// Every operation runs under a single write lock, which gives it the same
/// atomicity the PostgreSQL implementation gets from single statements and
/// short transactions.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
    cart_join_queries: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a catalogue product.
    pub async fn insert_product(&self, product: Product) {
        self.state
            .write()
            .await
            .products
            .insert(product.product_id, product);
    }

    /// Sets the user's default shipping address.
    pub async fn set_default_address(&self, user_id: UserId, address_id: AddressId) {
        self.state
            .write()
            .await
            .default_addresses
            .insert(user_id, address_id);
    }

    /// Returns how many times the cart join query has run.
    pub fn cart_join_queries(&self) -> usize {
        self.cart_join_queries.load(Ordering::SeqCst)
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of outbox messages not yet published.
    pub async fn unpublished_outbox_count(&self) -> usize {
        self.state
            .read()
            .await
            .outbox
            .iter()
            .filter(|row| row.published_at.is_none())
            .count()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_order<F>(
        &self,
        order: NewOrder,
        outbox: F,
    ) -> Result<(Order, Vec<OrderLineItem>, Vec<OutboxMessage>)>
    where
        F: FnOnce(&Order, &[OrderLineItem]) -> Result<Vec<OutboxMessage>> + Send,
    {
        let mut state = self.state.write().await;

        state.next_order_id += 1;
        let order_id = OrderId::new(state.next_order_id);

        let created = Order {
            order_id,
            user_id: order.user_id,
            total_price: order.total_price,
            status: OrderStatus::AwaitingPayment,
            payment_status: PaymentStatus::Unpaid,
            address_id: order.address_id,
            created_at: Utc::now(),
        };
        let items: Vec<OrderLineItem> = order
            .items
            .iter()
            .map(|item| OrderLineItem {
                order_id,
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect();
        let messages = outbox(&created, &items)?;

        state.orders.insert(order_id, created.clone());
        state.line_items.extend(items.iter().copied());
        state.outbox.extend(messages.iter().cloned().map(|message| OutboxRow {
            message,
            published_at: None,
        }));

        Ok((created, items, messages))
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        // Ids are assigned in creation order.
        Ok(state
            .orders
            .values()
            .rev()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn order_line_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        let state = self.state.read().await;
        Ok(state
            .line_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .copied()
            .collect())
    }

    async fn mark_order_paid(&self, order_id: OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&order_id) {
            Some(order) if order.payment_status == PaymentStatus::Unpaid => {
                order.payment_status = PaymentStatus::Paid;
                order.status = OrderStatus::AwaitingShipment;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&order_id) else {
            return Ok(None);
        };
        order.status = OrderStatus::Cancelled;
        if order.payment_status == PaymentStatus::Unpaid {
            order.payment_status = PaymentStatus::Cancelled;
        }
        Ok(Some(order.clone()))
    }

    async fn default_address(&self, user_id: UserId) -> Result<Option<AddressId>> {
        Ok(self
            .state
            .read()
            .await
            .default_addresses
            .get(&user_id)
            .copied())
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&product_id).cloned())
    }

    async fn products_by_ids(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = product_ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect();
        products.sort_by_key(|p| p.product_id);
        Ok(products)
    }

    async fn add_sales(
        &self,
        product_id: ProductId,
        quantity: u64,
        dedup_key: Option<Uuid>,
    ) -> Result<SalesOutcome> {
        let mut state = self.state.write().await;

        if !state.products.contains_key(&product_id) {
            return Ok(SalesOutcome::UnknownProduct);
        }
        if let Some(key) = dedup_key
            && !state.sales_ledger.insert(key)
        {
            return Ok(SalesOutcome::Duplicate);
        }
        if let Some(product) = state.products.get_mut(&product_id) {
            product.sales += quantity;
        }
        Ok(SalesOutcome::Applied)
    }

    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        self.cart_join_queries.fetch_add(1, Ordering::SeqCst);

        let state = self.state.read().await;
        let lines = state
            .cart
            .iter()
            .filter(|row| row.user_id == user_id && row.status == CartStatus::InCart)
            .filter_map(|row| {
                state.products.get(&row.product_id).map(|product| CartLine {
                    cart_id: Some(row.cart_id),
                    ..CartLine::from_product(product, row.quantity)
                })
            })
            .collect();
        Ok(lines)
    }

    async fn upsert_cart_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(row) = state.cart.iter_mut().find(|row| {
            row.user_id == user_id
                && row.product_id == product_id
                && row.status == CartStatus::InCart
        }) {
            row.quantity = row.quantity.saturating_add(quantity);
            return Ok(());
        }

        state.next_cart_id += 1;
        let cart_id = state.next_cart_id;
        state.cart.push(CartRow {
            cart_id,
            user_id,
            product_id,
            quantity,
            status: CartStatus::InCart,
        });
        Ok(())
    }

    async fn delete_cart_item(&self, user_id: UserId, product_id: ProductId) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.cart.len();
        state.cart.retain(|row| {
            !(row.user_id == user_id
                && row.product_id == product_id
                && row.status == CartStatus::InCart)
        });
        Ok((before - state.cart.len()) as u64)
    }

    async fn set_cart_item_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut affected = 0;
        for row in state.cart.iter_mut().filter(|row| {
            row.user_id == user_id
                && row.product_id == product_id
                && row.status == CartStatus::InCart
        }) {
            row.quantity = quantity;
            affected += 1;
        }
        Ok(affected)
    }

    async fn pending_outbox(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>> {
        let state = self.state.read().await;
        let mut pending: Vec<OutboxMessage> = state
            .outbox
            .iter()
            .filter(|row| row.published_at.is_none() && row.message.created_at <= created_before)
            .map(|row| row.message.clone())
            .collect();
        pending.sort_by_key(|m| m.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_outbox_published(&self, ids: &[Uuid]) -> Result<()> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        for row in state
            .outbox
            .iter_mut()
            .filter(|row| ids.contains(&row.message.id))
        {
            row.published_at.get_or_insert(now);
        }
        Ok(())
    }
}
