//! Bridge errors

use crate::runtime::ScriptError;
use thiserror::Error;
use weft_fabric::FabricError;
use weft_modules::ModuleError;
use weft_mount::MountError;
use weft_queue::{QueueError, QueueRole};

/// Errors from configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors from the instance and the Fabric binding
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Instance has been destroyed")]
    InstanceDestroyed,

    #[error("Instance is not initialized")]
    NotInitialized,

    #[error("Instance is already initialized")]
    AlreadyInitialized,

    #[error("Instance cannot be destroyed from the {0} queue")]
    DestroyOnQueue(QueueRole),

    #[error("{0} requires dev mode")]
    DevModeRequired(&'static str),

    #[error("No script runtime was provided")]
    MissingRuntime,

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Fabric error: {0}")]
    Fabric(#[from] FabricError),

    #[error("Mount error: {0}")]
    Mount(#[from] MountError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
