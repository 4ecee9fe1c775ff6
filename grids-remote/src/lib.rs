use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use grids_core::{MirrorOutcome, RemoteUnavailable, ThumbnailMirror};

pub const BINARY_KEY_PREFIX: &str = "binary:";
pub const GLWORB_KEY_PREFIX: &str = "glworb:";

/// Metadata record mirrored alongside a thumbnail blob.
#[derive(Debug, Clone, Serialize)]
pub struct GlworbRecord {
    pub uuid: String,
    pub binary_key: String,
    pub created: String,
    pub slurp_method: String,
}

pub trait BlobTransport: Send + Sync {
    fn put_blob(&self, key: &str, bytes: &[u8]) -> Result<(), RemoteUnavailable>;
    fn put_record(&self, key: &str, record: &GlworbRecord) -> Result<(), RemoteUnavailable>;
}

/// Mirrors grid thumbnails into a remote key/value blob store, skipping the
/// write whenever the content is unchanged since the last mirror for that
/// identity. Purely best-effort: callers treat failures as warnings.
pub struct RemoteCache {
    transport: Box<dyn BlobTransport>,
    slurp_method: String,
    mirrored: Mutex<HashMap<String, String>>,
}

impl RemoteCache {
    pub fn new(transport: Box<dyn BlobTransport>, slurp_method: impl Into<String>) -> Self {
        Self {
            transport,
            slurp_method: slurp_method.into(),
            mirrored: Mutex::new(HashMap::new()),
        }
    }
}

impl ThumbnailMirror for RemoteCache {
    fn mirror(&self, identity: &str, thumbnail: &[u8]) -> Result<MirrorOutcome, RemoteUnavailable> {
        let content_hash = hex::encode(Sha256::digest(thumbnail));
        if self.mirrored.lock().get(identity) == Some(&content_hash) {
            debug!(identity, "thumbnail unchanged since last mirror; skipping");
            return Ok(MirrorOutcome::Skipped);
        }

        let binary_key = format!("{BINARY_KEY_PREFIX}{identity}");
        self.transport.put_blob(&binary_key, thumbnail)?;

        let created = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| RemoteUnavailable {
                reason: format!("timestamp formatting failed: {err}"),
            })?;
        let record = GlworbRecord {
            uuid: Uuid::new_v4().to_string(),
            binary_key,
            created,
            slurp_method: self.slurp_method.clone(),
        };
        self.transport
            .put_record(&format!("{GLWORB_KEY_PREFIX}{identity}"), &record)?;

        // Only remember the hash once both writes landed, so a failed
        // mirror retries in full on the next save.
        self.mirrored
            .lock()
            .insert(identity.to_string(), content_hash);
        info!(identity, "thumbnail mirrored to remote store");
        Ok(MirrorOutcome::Mirrored)
    }
}

/// HTTP transport: blobs PUT to `<endpoint>/blob/<key>`, records PUT to
/// `<endpoint>/record/<key>`. Requests carry a bounded timeout so a slow
/// remote can never stall the local save path indefinitely.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RemoteUnavailable> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RemoteUnavailable {
                reason: format!("failed to build HTTP client: {err}"),
            })?;
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Ok(Self { client, endpoint })
    }

    fn unavailable(err: reqwest::Error) -> RemoteUnavailable {
        RemoteUnavailable {
            reason: err.to_string(),
        }
    }
}

impl BlobTransport for HttpTransport {
    fn put_blob(&self, key: &str, bytes: &[u8]) -> Result<(), RemoteUnavailable> {
        let url = format!("{}/blob/{key}", self.endpoint);
        self.client
            .put(&url)
            .header("content-type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(Self::unavailable)?;
        Ok(())
    }

    fn put_record(&self, key: &str, record: &GlworbRecord) -> Result<(), RemoteUnavailable> {
        let url = format!("{}/record/{key}", self.endpoint);
        self.client
            .put(&url)
            .json(record)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| {
                warn!(key, %err, "glworb record write failed");
                Self::unavailable(err)
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct MemoryTransport {
        blobs: Mutex<Vec<(String, Vec<u8>)>>,
        records: Mutex<Vec<(String, GlworbRecord)>>,
        offline: Mutex<bool>,
    }

    impl MemoryTransport {
        fn set_offline(&self, offline: bool) {
            *self.offline.lock() = offline;
        }

        fn check_online(&self) -> Result<(), RemoteUnavailable> {
            if *self.offline.lock() {
                return Err(RemoteUnavailable {
                    reason: "connection refused".to_string(),
                });
            }
            Ok(())
        }
    }

    impl BlobTransport for Arc<MemoryTransport> {
        fn put_blob(&self, key: &str, bytes: &[u8]) -> Result<(), RemoteUnavailable> {
            self.check_online()?;
            self.blobs.lock().push((key.to_string(), bytes.to_vec()));
            Ok(())
        }

        fn put_record(&self, key: &str, record: &GlworbRecord) -> Result<(), RemoteUnavailable> {
            self.check_online()?;
            self.records.lock().push((key.to_string(), record.clone()));
            Ok(())
        }
    }

    #[test]
    fn identical_content_mirrors_exactly_once() {
        let transport = Arc::new(MemoryTransport::default());
        let cache = RemoteCache::new(Box::new(Arc::clone(&transport)), "grid_thumbnail");

        let first = cache.mirror("abc123", b"thumbnail bytes").unwrap();
        assert_eq!(first, MirrorOutcome::Mirrored);
        let second = cache.mirror("abc123", b"thumbnail bytes").unwrap();
        assert_eq!(second, MirrorOutcome::Skipped);

        assert_eq!(transport.blobs.lock().len(), 1);
        assert_eq!(transport.records.lock().len(), 1);
    }

    #[test]
    fn changed_content_mirrors_again() {
        let transport = Arc::new(MemoryTransport::default());
        let cache = RemoteCache::new(Box::new(Arc::clone(&transport)), "grid_thumbnail");

        cache.mirror("abc123", b"first").unwrap();
        let outcome = cache.mirror("abc123", b"second").unwrap();
        assert_eq!(outcome, MirrorOutcome::Mirrored);
        assert_eq!(transport.blobs.lock().len(), 2);
    }

    #[test]
    fn identities_are_tracked_independently() {
        let transport = Arc::new(MemoryTransport::default());
        let cache = RemoteCache::new(Box::new(Arc::clone(&transport)), "grid_thumbnail");

        cache.mirror("aaa", b"same bytes").unwrap();
        let other = cache.mirror("bbb", b"same bytes").unwrap();
        assert_eq!(other, MirrorOutcome::Mirrored);
        assert_eq!(transport.blobs.lock().len(), 2);
    }

    #[test]
    fn record_carries_key_scheme_and_provenance() {
        let transport = Arc::new(MemoryTransport::default());
        let cache = RemoteCache::new(Box::new(Arc::clone(&transport)), "grid_thumbnail");

        cache.mirror("abc123", b"bytes").unwrap();

        let blobs = transport.blobs.lock();
        assert_eq!(blobs[0].0, "binary:abc123");
        let records = transport.records.lock();
        let (key, record) = &records[0];
        assert_eq!(key, "glworb:abc123");
        assert_eq!(record.binary_key, "binary:abc123");
        assert_eq!(record.slurp_method, "grid_thumbnail");
        assert!(!record.uuid.is_empty());
        assert!(!record.created.is_empty());
    }

    #[test]
    fn failed_mirror_retries_in_full() {
        let transport = Arc::new(MemoryTransport::default());
        let cache = RemoteCache::new(Box::new(Arc::clone(&transport)), "grid_thumbnail");

        transport.set_offline(true);
        assert!(cache.mirror("abc123", b"bytes").is_err());

        // The hash was not recorded, so the same bytes mirror instead of
        // being skipped once the remote comes back.
        transport.set_offline(false);
        let outcome = cache.mirror("abc123", b"bytes").unwrap();
        assert_eq!(outcome, MirrorOutcome::Mirrored);
        assert_eq!(transport.blobs.lock().len(), 1);
        assert_eq!(transport.records.lock().len(), 1);
    }
}
