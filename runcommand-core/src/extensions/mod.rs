pub mod acquirer;
pub mod credentials;
pub mod decoder;
pub mod lifecycle;
pub mod runner;
pub mod seqnum;
pub mod status;

// Re-export commonly used types and functions
pub use acquirer::*;
pub use credentials::*;
pub use decoder::*;
pub use lifecycle::*;
pub use runner::*;
pub use seqnum::*;
pub use status::*;
