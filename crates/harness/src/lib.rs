pub mod canvas;
pub mod flaky;

pub use canvas::{TestCanvas, TestEngine};
pub use flaky::{FailureSwitch, FlakyStore};

use tracing_subscriber::EnvFilter;

/// Route engine logs to the test writer, filtered by `RUST_LOG`. Safe to
/// call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
