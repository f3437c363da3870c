//! MTG card indexer.
//!
//! Loads MTGJSON set files into Elasticsearch, enriching every card and token with
//! its Scryfall artwork URL. URLs come from a persistent, resumable cache filled
//! from Scryfall's bulk snapshot or, failing that, rate-limited point lookups.

pub mod cache;
pub mod config;
pub mod normalization;
pub mod providers;
pub mod search;
pub mod telemetry;

pub mod util {
    pub mod download;
    pub mod env;
}
