//! RarityScope Library
//!
//! Rarity-weighted bargain ranking and cached analytics for one NFT collection

pub mod analytics;
pub mod config;
pub mod dashboard;
pub mod market;
pub mod opportunity;
pub mod pricing;
pub mod rarity;
pub mod types;
