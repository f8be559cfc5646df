mod batch;
mod blob;
mod channel;
mod collection;
mod dict;
mod list;
mod lock;
mod queue;
mod schema;
mod session;
mod time;
mod timelog;
mod vector;

pub use batch::{BlobBatch, CollectionBatch, DictBatch, ListBatch, LogBatch};
pub use blob::Blob;
pub use channel::{Channel, Subscription};
pub use collection::{Collection, Direction, Document, FtsFields, Graph, rerank};
pub use dict::Dict;
pub use list::List;
pub use lock::{FairLock, LockGuard};
pub use queue::Queue;
pub use session::Session;
pub use timelog::{Event, Live, TimeLog};
pub use vector::{Hit, VectorIndex};

pub use beaver_common::{AnyMap, BytesCodec, Codec, Error, JsonCodec, LockOptions, Result, SessionOptions};
