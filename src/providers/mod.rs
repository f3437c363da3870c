pub mod mtgjson;
pub mod scryfall;
