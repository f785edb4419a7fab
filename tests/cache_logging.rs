use std::{
    io,
    num::NonZeroUsize,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use hybrid_cache::cache::{
    EntryOptions, HybridCache, MemorySharedStore, MemoryStore, SharedStore, SharedStorePolicy,
    StoreError,
};
use tracing::Level;

const TTL: Duration = Duration::from_secs(60);

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        let bytes = self.0.lock().expect("log buffer lock").clone();
        String::from_utf8(bytes).expect("utf-8 log output")
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}

struct UnreachableStore;

#[async_trait]
impl SharedStore for UnreachableStore {
    async fn get_string(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::new("connection refused"))
    }

    async fn set_string(
        &self,
        _key: &str,
        _value: &str,
        _options: EntryOptions,
    ) -> Result<(), StoreError> {
        Err(StoreError::new("connection refused"))
    }
}

fn local() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(NonZeroUsize::new(8).expect("capacity")))
}

fn lines_with<'a>(output: &'a str, needle: &str) -> Vec<&'a str> {
    output.lines().filter(|line| line.contains(needle)).collect()
}

#[tokio::test]
async fn population_events_carry_the_key() {
    let (buffer, _guard) = capture();
    let cache = HybridCache::new(
        local(),
        Arc::new(MemorySharedStore::new()),
        SharedStorePolicy::FailFast,
    );

    let value: u32 = cache
        .get_or_create("orders-7", || async { Ok::<_, io::Error>(7_u32) }, TTL)
        .await
        .expect("value");
    assert_eq!(value, 7);

    let output = buffer.contents();
    let misses = lines_with(&output, "invoking value factory");
    assert_eq!(misses.len(), 1, "log output:\n{output}");
    assert!(misses[0].contains("key=orders-7"), "log output:\n{output}");
}

#[tokio::test]
async fn degraded_store_warnings_carry_the_key() {
    let (buffer, _guard) = capture();
    let cache = HybridCache::new(
        local(),
        Arc::new(UnreachableStore),
        SharedStorePolicy::Degrade,
    );

    cache
        .get_or_create("orders-9", || async { Ok::<_, io::Error>(9_u32) }, TTL)
        .await
        .expect("degraded value");

    let output = buffer.contents();
    for message in [
        "shared store unavailable, treating as miss",
        "shared store unavailable, caching locally only",
    ] {
        let lines = lines_with(&output, message);
        assert_eq!(lines.len(), 1, "log output:\n{output}");
        assert!(lines[0].contains("WARN"), "log output:\n{output}");
        assert!(lines[0].contains("key=orders-9"), "log output:\n{output}");
    }
}
