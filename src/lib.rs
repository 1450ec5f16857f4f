pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod pool;
pub mod vm;

// Re-export main types
pub use config::{Config, HostConfig, PoolConfig};
pub use engine::{Engine, Resumed};
pub use error::{ContractViolation, EngineError, PoolError, ScriptError};
pub use pool::{
    CallBracket, CallOutcome, CallbackScope, EntryId, PoolStats, ThreadEntry, ThreadPool,
    ThreadState,
};
