pub mod timestamps;

pub use timestamps::*;
