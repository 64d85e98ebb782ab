// Application layer: one method per request, each a single unit of work.

mod enrollment;
pub mod error;
mod payments;
pub mod response;
mod service;

pub use error::*;
pub use response::*;
pub use service::*;
