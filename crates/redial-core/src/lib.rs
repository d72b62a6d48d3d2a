pub mod config;
pub mod logging;

pub mod background;
pub mod dispatcher;
pub mod download;
pub mod error;
pub mod reachability;
pub mod request;
pub mod retry;
pub mod transport;
