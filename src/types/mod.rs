pub mod signal;
pub mod trading;

pub use signal::*;
pub use trading::*;
