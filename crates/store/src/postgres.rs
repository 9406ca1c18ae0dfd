use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, Money, OrderId, ProductId, Topic, UserId};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    CartLine, NewOrder, Order, OrderLineItem, OrderStatus, OutboxMessage, PaymentStatus, Product,
    Result, SalesOutcome, StoreError, store::Store,
};

const ORDER_COLUMNS: &str =
    "order_id, user_id, total_price_cents, status, payment_status, address_id, created_at";

const PRODUCT_COLUMNS: &str =
    "product_id, product_name, product_description, price_cents, image_url, sales";

/// PostgreSQL-backed primary store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts a catalogue product and returns its assigned id.
    pub async fn insert_product(&self, product: &Product) -> Result<ProductId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (product_name, product_description, price_cents, image_url, sales)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING product_id
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(&product.image_url)
        .bind(product.sales as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(ProductId::from_i64(id))
    }

    /// Inserts a shipping address for a user and returns its id.
    pub async fn insert_address(&self, user_id: UserId, is_default: bool) -> Result<AddressId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO addresses (user_id, is_default) VALUES ($1, $2) RETURNING address_id",
        )
        .bind(user_id.as_i64())
        .bind(is_default)
        .fetch_one(&self.pool)
        .await?;

        Ok(AddressId::from_i64(id))
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        Ok(Order {
            order_id: OrderId::from_i64(row.try_get("order_id")?),
            user_id: UserId::from_i64(row.try_get("user_id")?),
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            status: OrderStatus::parse(row.try_get("status")?)?,
            payment_status: PaymentStatus::parse(row.try_get("payment_status")?)?,
            address_id: AddressId::from_i64(row.try_get("address_id")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            product_id: ProductId::from_i64(row.try_get("product_id")?),
            name: row.try_get("product_name")?,
            description: row.try_get("product_description")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            image_url: row.try_get("image_url")?,
            sales: row.try_get::<i64, _>("sales")? as u64,
        })
    }

    fn row_to_outbox(row: PgRow) -> Result<OutboxMessage> {
        let topic: String = row.try_get("topic")?;
        let topic = Topic::from_name(&topic).ok_or(StoreError::InvalidColumn {
            column: "outbox.topic",
            value: topic,
        })?;

        Ok(OutboxMessage {
            id: row.try_get("id")?,
            topic,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn create_order<F>(
        &self,
        order: NewOrder,
        outbox: F,
    ) -> Result<(Order, Vec<OrderLineItem>, Vec<OutboxMessage>)>
    where
        F: FnOnce(&Order, &[OrderLineItem]) -> Result<Vec<OutboxMessage>> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (user_id, total_price_cents, address_id)
            VALUES ($1, $2, $3)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.user_id.as_i64())
        .bind(order.total_price.cents())
        .bind(order.address_id.as_i64())
        .fetch_one(&mut *tx)
        .await?;
        let created = Self::row_to_order(row)?;

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let num = i32::try_from(item.quantity).map_err(|_| StoreError::InvalidColumn {
                column: "order_products.num",
                value: item.quantity.to_string(),
            })?;
            sqlx::query("INSERT INTO order_products (order_id, product_id, num) VALUES ($1, $2, $3)")
                .bind(created.order_id.as_i64())
                .bind(item.product_id.as_i64())
                .bind(num)
                .execute(&mut *tx)
                .await?;

            items.push(OrderLineItem {
                order_id: created.order_id,
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }

        let messages = outbox(&created, &items)?;
        for message in &messages {
            sqlx::query(
                "INSERT INTO outbox (id, topic, payload, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(message.id)
            .bind(message.topic.name())
            .bind(&message.payload)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok((created, items, messages))
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> =
            sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1"))
                .bind(order_id.as_i64())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, order_id DESC
            "#
        ))
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn order_line_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, num
            FROM order_products
            WHERE order_id = $1
            ORDER BY order_product_id ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderLineItem {
                    order_id: OrderId::from_i64(row.try_get("order_id")?),
                    product_id: ProductId::from_i64(row.try_get("product_id")?),
                    quantity: row.try_get::<i32, _>("num")? as u32,
                })
            })
            .collect()
    }

    async fn mark_order_paid(&self, order_id: OrderId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = 'paid', status = 'awaiting_shipment'
            WHERE order_id = $1 AND payment_status = 'unpaid'
            "#,
        )
        .bind(order_id.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = 'cancelled',
                payment_status = CASE WHEN payment_status = 'unpaid' THEN 'cancelled' ELSE payment_status END
            WHERE order_id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn default_address(&self, user_id: UserId) -> Result<Option<AddressId>> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT address_id FROM addresses
            WHERE user_id = $1 AND is_default
            ORDER BY address_id ASC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(AddressId::from_i64))
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1"
        ))
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn products_by_ids(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<i64> = product_ids.iter().map(ProductId::as_i64).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = ANY($1) ORDER BY product_id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn add_sales(
        &self,
        product_id: ProductId,
        quantity: u64,
        dedup_key: Option<Uuid>,
    ) -> Result<SalesOutcome> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE products SET sales = sales + $1 WHERE product_id = $2")
            .bind(quantity as i64)
            .bind(product_id.as_i64())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            tx.rollback().await?;
            return Ok(SalesOutcome::UnknownProduct);
        }

        if let Some(key) = dedup_key {
            let recorded = sqlx::query(
                r#"
                INSERT INTO sales_ledger (event_id, product_id, quantity)
                VALUES ($1, $2, $3)
                ON CONFLICT (event_id) DO NOTHING
                "#,
            )
            .bind(key)
            .bind(product_id.as_i64())
            .bind(quantity as i64)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if recorded == 0 {
                tx.rollback().await?;
                return Ok(SalesOutcome::Duplicate);
            }
        }

        tx.commit().await?;
        Ok(SalesOutcome::Applied)
    }

    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT c.cart_id, p.product_id, p.product_name, p.product_description,
                   p.price_cents, p.image_url, c.quantity
            FROM cart_items c
            JOIN products p ON c.product_id = p.product_id
            WHERE c.user_id = $1 AND c.status = 'in_cart'
            ORDER BY c.cart_id ASC
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CartLine {
                    cart_id: Some(row.try_get::<i64, _>("cart_id")? as u64),
                    product_id: ProductId::from_i64(row.try_get("product_id")?),
                    product_name: row.try_get("product_name")?,
                    product_description: row.try_get("product_description")?,
                    price: Money::from_cents(row.try_get("price_cents")?),
                    image_url: row.try_get("image_url")?,
                    quantity: row.try_get("quantity")?,
                })
            })
            .collect()
    }

    async fn upsert_cart_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity, status)
            VALUES ($1, $2, $3, 'in_cart')
            ON CONFLICT ON CONSTRAINT unique_cart_entry
            DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
            "#,
        )
        .bind(user_id.as_i64())
        .bind(product_id.as_i64())
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_cart_item(&self, user_id: UserId, product_id: ProductId) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2 AND status = 'in_cart'",
        )
        .bind(user_id.as_i64())
        .bind(product_id.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_cart_item_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE cart_items SET quantity = $3
            WHERE user_id = $1 AND product_id = $2 AND status = 'in_cart'
            "#,
        )
        .bind(user_id.as_i64())
        .bind(product_id.as_i64())
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn pending_outbox(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, topic, payload, created_at
            FROM outbox
            WHERE published_at IS NULL AND created_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(created_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn mark_outbox_published(&self, ids: &[Uuid]) -> Result<()> {
        sqlx::query(
            "UPDATE outbox SET published_at = NOW() WHERE id = ANY($1) AND published_at IS NULL",
        )
        .bind(ids.to_vec())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
