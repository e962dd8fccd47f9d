mod constants;
mod environment;
mod settings;

pub use constants::*;
pub use environment::HandlerEnvironment;
pub use settings::{HandlerSettings, ManagedIdentity, ProtectedSettings, PublicSettings, ScriptSource, SourceSettings};
