//! Visitor identity: which client a hit belongs to.

mod client_ip;
mod policy;

pub use client_ip::{client_ip, FORWARDED_FOR, REAL_IP};
pub use policy::{visitor_id, IdentityPolicy};
