//! Operation surface of SharpLens: typed arguments, handlers, the batch
//! executor and the `{success, data, error}` envelope.

pub mod args;
pub mod batch;
pub mod dispatch;
pub mod envelope;
pub mod handlers;

pub use batch::{BatchItemError, BatchResult, EmptyInput};
pub use dispatch::{Dispatcher, Operation};
pub use envelope::{Envelope, ErrorBody};
pub use handlers::Handlers;
