//! API handlers module

pub mod audit;
pub mod health;
pub mod replies;
