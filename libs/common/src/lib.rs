//! Common library for the events service
//!
//! This crate provides the infrastructure shared by the service crates:
//! layered settings, PostgreSQL connectivity, the Redis pool and its atomic
//! script helpers, and the matching error types.
//!
//! ```rust,no_run
//! use common::database::{health_check, init_pool};
//! use common::settings::Settings;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load()?;
//!     let pool = init_pool(&settings.database).await?;
//!     let is_healthy = health_check(&pool).await?;
//!     println!("Database health check: {}", is_healthy);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod settings;
