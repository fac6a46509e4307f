//! HTTP surface (spec §4.6, component F).

mod controller;
mod request;
mod response;

pub use controller::{AppState, create_router};
pub use request::*;
pub use response::*;
