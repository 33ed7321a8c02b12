pub mod errors;
pub mod point;
pub mod results;

pub use errors::*;
pub use point::*;
pub use results::*;
