//! Port definitions for the Mailbox Store.

pub mod inbound;
pub mod outbound;
