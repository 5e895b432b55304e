//! Trellis Types - Shared domain types
//!
//! This crate contains domain types used across Trellis services:
//! - User identity
//! - Subscriptions and their lifecycle state machine
//! - The `SubscriptionCreated` event envelope

pub mod error;
pub mod event;
pub mod subscription;
pub mod user;

pub use error::*;
pub use event::*;
pub use subscription::*;
pub use user::*;
