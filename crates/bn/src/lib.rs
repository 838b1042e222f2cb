//! Exact and approximate inference over discrete-and-hybrid Bayesian
//! networks, with ancestral sequence reconstruction on phylogenetic trees.
//!
//! This crate is a thin facade over [`bn_core`]: it re-exports the public
//! surface and adds a one-line logging initializer for binaries that embed
//! the engine directly.

pub use bn_core::*;
pub use bn_error::{BnError, BnResult, ErrorCode};

/// Initialise a compact `tracing` subscriber reading `RUST_LOG`. Safe to
/// call more than once; only the first call takes effect.
pub fn init_logging() {
    use std::sync::Once;
    static INIT_LOGGING: Once = Once::new();

    INIT_LOGGING.call_once(|| {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .compact(),
            )
            .init();
    });
}
