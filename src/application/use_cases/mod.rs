//! Orchestration of the order lifecycle (spec §2 "Control flow").

mod cancel_order;
mod submit_signal;

pub use cancel_order::CancelOrderUseCase;
pub use submit_signal::SubmitSignalUseCase;
