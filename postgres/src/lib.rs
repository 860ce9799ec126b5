//! `PostgreSQL` aggregate store for the order info service.
//!
//! Implements [`OrderRepository`](order_info_core::OrderRepository) on top of
//! sqlx. An order is stored across four tables:
//!
//! - `orders`: the root row, keyed by `order_uid`
//! - `deliveries`: 1:1, keyed by `order_uid`
//! - `payments`: 1:1, keyed by `transaction` (equal to `order_uid`)
//! - `items`: 1:N, `BIGSERIAL` id used as the pagination cursor
//!
//! # Example
//!
//! ```no_run
//! use order_info_postgres::{PostgresOrderRepository, SCHEMA, apply_schema};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = PostgresOrderRepository::new("postgres://localhost/orders").await?;
//! apply_schema(repo.pool(), SCHEMA).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod repository;
mod rows;
mod schema;

pub use repository::PostgresOrderRepository;
pub use schema::{SCHEMA, apply_schema};
