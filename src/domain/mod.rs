mod account;
mod course;
mod integrity;
mod ledger;
mod money;
mod profile;

pub use account::*;
pub use course::*;
pub use integrity::*;
pub use ledger::*;
pub use money::*;
pub use profile::*;
