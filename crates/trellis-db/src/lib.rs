//! Trellis DB - Database abstractions
//!
//! Repository contracts for subscriptions and users, plus their SQLx-based
//! PostgreSQL implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_db::{create_pool, run_migrations, Repositories, SubscriptionRepository};
//!
//! let pool = create_pool("postgres://localhost/trellis").await?;
//! run_migrations(&pool).await?;
//! let repos = Repositories::new(pool);
//!
//! let row = repos.subscriptions.find_by_id(id).await?;
//! ```

pub mod error;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repo;

pub use error::{DbError, DbResult};
pub use models::*;
pub use pg::Repositories;
pub use pool::{create_pool, create_pool_with_options, run_migrations, DbPool, PoolOptions};
pub use repo::*;
