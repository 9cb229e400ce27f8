pub mod config;
pub mod logging;

pub mod client;
pub mod clock;
pub mod factory;
pub mod handler;
pub mod retry;
pub mod transport;

pub use client::{Client, Outcome, RequestOptions, Response};
pub use factory::CallFactory;
pub use handler::{CallSnapshot, CallState, Handler, Phase};
