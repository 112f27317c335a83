pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod render;
pub mod transfer;
pub mod util;

pub use cancel::CancelToken;
pub use error::TransferError;
