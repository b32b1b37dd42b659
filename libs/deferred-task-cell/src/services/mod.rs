pub mod clock;
pub mod manager;

pub use clock::*;
pub use manager::*;
