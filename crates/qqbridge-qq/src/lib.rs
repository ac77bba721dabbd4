pub mod adapter;
pub mod allow;
pub mod api;
pub mod attach;
pub mod dedup;
pub mod error;
pub mod event;
pub mod gateway;
pub mod handler;
pub mod media;
pub mod send;
pub mod seq;
pub mod token;
pub mod upload;

pub use adapter::{QqChannel, QqClient, CHANNEL_NAME};
pub use error::QqError;
