// CSV/JSON import and export for catalog and ledger data.

pub mod export;
pub mod import;

pub use export::*;
pub use import::*;
