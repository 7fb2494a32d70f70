//! ClosetSync: wardrobe ingestion from retail order emails.
//!
//! Searches a mailbox for order-confirmation emails, extracts the
//! purchased garments (structural parsers, a chat-model fallback, text
//! heuristics), normalizes them into wardrobe items and writes them to a
//! local database with duplicate detection.

pub mod config;
pub mod error;
pub mod mailbox;
pub mod normalize;
pub mod parsers;
pub mod pipeline;
pub mod retry;
pub mod store;
