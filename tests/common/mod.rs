//! Shared helpers for kitbag integration tests.
//!
//! This module is shared across test files using the tests/common/ pattern.

use std::sync::Once;

use flate2::write::GzEncoder;
use flate2::Compression;

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Builds a gzip-compressed tar blob from (path, contents) pairs, the
/// payload format the materializer unpacks.
#[allow(dead_code)]
pub fn archive_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *data)
            .expect("append tar entry");
    }
    builder
        .into_inner()
        .expect("finish tar stream")
        .finish()
        .expect("finish gzip stream")
}
