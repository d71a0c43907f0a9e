/// Initializes the tracing/logging infrastructure for the runtime.
///
/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`:
/// - `RUST_LOG=info` shows actor lifecycle and open/close of descriptors
/// - `RUST_LOG=debug` adds payloads, watches and context changes
/// - `RUST_LOG=rosix=debug` limits debug output to this crate
///
/// Calling it twice is harmless; the second call leaves the first subscriber in place.
///
/// # Example
///
/// ```ignore
/// setup_tracing();
/// tracing::info!("Runtime starting");
/// ```
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
