/// Install a `fmt` subscriber filtered by `RUST_LOG`, if the variable is set.
///
/// Meant for demos and tests. Does nothing without `RUST_LOG` or when a
/// global subscriber already exists, so calling it repeatedly is fine.
pub fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}
