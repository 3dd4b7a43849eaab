pub mod keys;
pub mod token;

pub use keys::*;
pub use token::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Malformed password hash")]
    MalformedHash,

    #[error("Unsupported password hash scheme: {0}")]
    UnsupportedScheme(String),
}
