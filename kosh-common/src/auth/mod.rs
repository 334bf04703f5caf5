pub mod token;

pub use token::{token_hash, Claims, TokenCodec, CLOCK_SKEW_SECS};
