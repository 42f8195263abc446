use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("accessory not present: {0}")]
    Missing(String),
    #[error("accessory fault: {0}")]
    Fault(String),
    #[error("set point out of range: {value} not in [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
