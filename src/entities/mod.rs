//! Persistence models backing the catalog, cart, order ledger and payouts.

pub mod cart_item;
pub mod checkout_session;
pub mod order;
pub mod order_item;
pub mod product;
pub mod withdraw_request;
