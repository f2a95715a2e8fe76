//! Tracing subscriber setup for processes embedding the engine

use anyhow::anyhow;

/// Default directive applied on top of `RUST_LOG`
pub const DEFAULT_DIRECTIVE: &str = "knowgraph_core=info";

/// Install a global `fmt` subscriber filtered by `RUST_LOG` plus `directive`.
///
/// Fails if a global subscriber is already installed.
pub fn init(directive: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
