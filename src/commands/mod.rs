//! CLI command implementations.

pub mod legality;
pub mod price;

pub use legality::LegalityCommand;
pub use price::PriceCommand;
