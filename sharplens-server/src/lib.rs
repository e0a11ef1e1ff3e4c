pub mod logging;
pub mod server;

pub use server::{Server, CANCEL_OPERATION};
