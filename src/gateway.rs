use crate::errors::IngestResult;
use async_trait::async_trait;

/// The retrieval engine the ingest queue writes into and queries are answered from
#[async_trait]
pub trait IndexGateway: Send + Sync {
    /// Connect to the backing stores. Must be called before any other method.
    async fn initialize(&self) -> IngestResult<()>;

    /// Insert or update documents; `ids[i]` identifies `contents[i]`
    async fn upsert(&self, ids: &[String], contents: &[String]) -> IngestResult<()>;

    async fn delete_by_ids(&self, ids: &[String]) -> IngestResult<()>;

    /// Answer `text` from the `top_k` best matching chunks, `None` if nothing matched
    async fn query(&self, text: &str, top_k: usize) -> IngestResult<Option<String>>;

    async fn shutdown(&self) -> IngestResult<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::IndexGateway;
    use crate::errors::{IngestError, IngestResult};
    use crate::pending::FlushBatch;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// In-memory gateway that records every call
    #[derive(Default)]
    pub struct RecordingGateway {
        initialized: AtomicBool,
        fail_upserts: AtomicBool,
        hold_upserts: AtomicBool,
        upsert_started: Notify,
        upsert_released: Notify,
        fail_deletes: AtomicBool,
        upserts: Mutex<Vec<FlushBatch>>,
        deletes: Mutex<Vec<Vec<String>>>,
        queries: Mutex<Vec<(String, usize)>>,
        shutdowns: Mutex<usize>,
    }

    impl RecordingGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_upserts(&self, fail: bool) {
            self.fail_upserts.store(fail, Ordering::SeqCst);
        }

        /// Make the next upserts wait until `release_upserts` is called
        pub fn hold_upserts(&self) {
            self.hold_upserts.store(true, Ordering::SeqCst);
        }

        pub fn release_upserts(&self) {
            self.hold_upserts.store(false, Ordering::SeqCst);
            self.upsert_released.notify_one();
        }

        /// Wait until a held upsert has been entered
        pub async fn upsert_started(&self) {
            self.upsert_started.notified().await;
        }

        pub fn set_fail_deletes(&self, fail: bool) {
            self.fail_deletes.store(fail, Ordering::SeqCst);
        }

        pub fn upserts(&self) -> Vec<FlushBatch> {
            self.upserts.lock().unwrap().clone()
        }

        pub fn deletes(&self) -> Vec<Vec<String>> {
            self.deletes.lock().unwrap().clone()
        }

        pub fn queries(&self) -> Vec<(String, usize)> {
            self.queries.lock().unwrap().clone()
        }

        pub fn shutdown_count(&self) -> usize {
            *self.shutdowns.lock().unwrap()
        }

        fn ensure_initialized(&self) -> IngestResult<()> {
            if self.initialized.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(IngestError::NotInitialized)
            }
        }
    }

    #[async_trait]
    impl IndexGateway for RecordingGateway {
        async fn initialize(&self) -> IngestResult<()> {
            self.initialized.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn upsert(&self, ids: &[String], contents: &[String]) -> IngestResult<()> {
            self.ensure_initialized()?;
            self.upserts.lock().unwrap().push(FlushBatch {
                ids: ids.to_vec(),
                contents: contents.to_vec(),
            });
            if self.hold_upserts.load(Ordering::SeqCst) {
                self.upsert_started.notify_one();
                self.upsert_released.notified().await;
            }
            if self.fail_upserts.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("vector store unavailable").into());
            }
            Ok(())
        }

        async fn delete_by_ids(&self, ids: &[String]) -> IngestResult<()> {
            self.ensure_initialized()?;
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("delete rejected").into());
            }
            self.deletes.lock().unwrap().push(ids.to_vec());
            Ok(())
        }

        async fn query(&self, text: &str, top_k: usize) -> IngestResult<Option<String>> {
            self.ensure_initialized()?;
            self.queries.lock().unwrap().push((text.to_string(), top_k));
            if text.is_empty() {
                return Ok(None);
            }
            Ok(Some(format!("answer to {}", text)))
        }

        async fn shutdown(&self) -> IngestResult<()> {
            self.initialized.store(false, Ordering::SeqCst);
            *self.shutdowns.lock().unwrap() += 1;
            Ok(())
        }
    }
}
