pub mod arena;
pub mod config;
pub mod console;
pub mod constants;
pub mod error;
pub mod io;
pub mod memory;
pub mod policy;
pub mod process;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod shell;
pub mod stats;
pub mod translation;
pub mod vm_manager;
pub mod workers;

// Re-export commonly used items for convenience
pub use config::{KernelConfig, ScriptSharing};
pub use console::Console;
pub use constants::*;
pub use error::{ConfigError, KernelError, Result};
pub use policy::Policy;
pub use scheduler::{Flow, Kernel, LineHandler};
pub use shell::{Shell, ShellError};
pub use translation::{TranslationResult, VirtualAddress};
pub use vm_manager::{FaultReport, VmManager};
