pub mod forge;
pub mod kapacitor;
pub mod logging;
pub mod script;
mod validate;

pub use forge::ForgeConfig;
pub use kapacitor::KapacitorConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use script::ScriptConfig;
