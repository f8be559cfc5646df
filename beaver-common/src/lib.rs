mod codec;
mod config;
mod error;
mod ids;

pub use codec::{AnyMap, BytesCodec, Codec, JsonCodec};
pub use config::{LockOptions, SessionOptions};
pub use error::Error;
pub use ids::WaiterId;

pub type Result<T> = std::result::Result<T, Error>;
