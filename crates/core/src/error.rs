use thiserror::Error;

#[derive(Error, Debug)]
pub enum CadenceError {
    #[error("Invalid instance state: {0}")]
    InvalidState(String),

    #[error("Invalid rule key: {0}")]
    InvalidKey(String),
}
