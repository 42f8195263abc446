use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum OptimizerError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("parameter channel error: {0}")]
    Channel(String),
    #[error("unit context error: {0}")]
    Context(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing unit name")]
    MissingUnit,
    #[error("missing turbidostat configuration")]
    MissingTurbidostat,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
