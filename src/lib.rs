// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Trading Signal Gateway - Rust Core Library
//!
//! Accepts webhook and operator-submitted trade signals, validates and
//! normalizes them, persists durable order records, routes them to the
//! single broker configured for this process (Oanda v20 or Alpaca v2),
//! reconciles the broker's reply into the order's lifecycle status, and
//! exposes order/position query endpoints.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside -> outside)
//!
//! - **Domain**: the order aggregate and its lifecycle state machine,
//!   the cross-component error taxonomy, identifiers, timestamps.
//! - **Application**: the signal processor (validation/normalization),
//!   port definitions (`BrokerPort`, `OrderStorePort`, `ConfigLookup`),
//!   and the use cases that orchestrate them (`SubmitSignalUseCase`,
//!   `CancelOrderUseCase`).
//! - **Infrastructure**: adapters - the Oanda and Alpaca broker clients,
//!   the Turso-backed order store, the layered YAML/environment
//!   configuration store, and the axum HTTP surface.

// `std::env::set_var`/`remove_var` became unsafe in edition 2024; the
// config-overlay tests need them to mutate process env per-test, so the
// forbid is scoped to non-test builds.
#![cfg_attr(not(test), forbid(unsafe_code))]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - the order aggregate and lifecycle state machine, with
/// no external dependencies.
pub mod domain;

/// Application layer - use cases and port definitions.
pub mod application;

/// Infrastructure layer - adapters for the ports the application layer
/// defines.
pub mod infrastructure;

// Domain re-exports
pub use domain::{EngineError, InternalId, Order, OrderStatus, OrderType, TradeParams, Timestamp};

// Application re-exports
pub use application::ports::{BrokerError, BrokerPort, BrokerReply, ConfigLookup, OrderStorePort};
pub use application::use_cases::{CancelOrderUseCase, SubmitSignalUseCase};
pub use application::process_signal;

// Infrastructure re-exports
pub use infrastructure::broker::{AlpacaBroker, OandaBroker, build_broker};
pub use infrastructure::config::ConfigStore;
pub use infrastructure::http::{AppState, create_router};
pub use infrastructure::persistence::TursoOrderStore;
