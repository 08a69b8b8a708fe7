pub mod queue;
pub mod router;
pub mod types;


pub use queue::*;
pub use router::*;
pub use types::*;
