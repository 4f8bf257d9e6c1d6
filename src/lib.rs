//! Bahamm group-buy settlement service
//!
//! Backend core for the group-buy storefront: a leader opens a group at a
//! friend-tier price, followers join by paying their own orders, and when
//! the group closes the settlement engine works out whether the leader owes
//! a top-up payment for friends who never showed.
//!
//! ## Layout
//! - `domain` - pricing ladder, group/order state model, basket snapshot
//! - `settlement` - the calculator and the settlement payment workflow
//! - `sweeper` - background task that closes expired groups
//! - `gateway` - payment gateway client (trait + HTTP implementation)
//! - `routes` - axum handlers; thin glue over the core

pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod routes;
pub mod settlement;
pub mod sweeper;

pub use error::{AppError, Result};
