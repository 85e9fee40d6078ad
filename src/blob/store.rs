use tracing::{debug, error, info, warn};

use super::channel::{BackendError, Channel};
use super::lineage::{self, Artifact, Resolution, Verdict, LINEAGE_DEPTH};
use crate::error::StoreError;
use crate::record::{Snapshot, Version};

pub const DEFAULT_FILENAME: &str = "views.json";
pub const DEFAULT_SCAN_WINDOW: usize = 50;
/// Discord caps a message listing at 100.
pub const MAX_SCAN_WINDOW: usize = 100;

/// Times `load` re-scans when the artifact it picked vanishes before it is read.
const LOAD_ATTEMPTS: usize = 3;
/// Scans spent looking for an upload whose call reported an error.
const FIND_UPLOAD_ATTEMPTS: usize = 3;

/// The message a save published.
struct Posted {
    id: String,
    ordinal: u64,
}

/// Versioned storage of one JSON snapshot in a channel that can only list,
/// fetch, upload and delete.
///
/// - [`load`](Self::load) finds the live artifact among the most recent
///   `scan_window` messages. Nothing found is an empty snapshot at
///   [`Version::none`]; an unparsable artifact is [`StoreError::Malformed`].
/// - [`save`](Self::save) publishes a new artifact only if the live one is
///   still `expected`, uploading before deleting so readers never see zero
///   artifacts. Losing a race to another writer is [`StoreError::Conflict`].
pub struct BlobStore<C> {
    channel: C,
    filename: String,
    scan_window: usize,
}

impl<C: Channel> BlobStore<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            filename: DEFAULT_FILENAME.to_string(),
            scan_window: DEFAULT_SCAN_WINDOW,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Number of recent messages inspected per scan, clamped to `1..=100`.
    pub fn with_scan_window(mut self, scan_window: usize) -> Self {
        self.scan_window = scan_window.clamp(1, MAX_SCAN_WINDOW);
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn scan_window(&self) -> usize {
        self.scan_window
    }

    /// Read the current snapshot and the version it was read at.
    pub fn load(&self) -> Result<Snapshot, StoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let resolution = self.scan()?;
            let Some(artifact) = resolution.current() else {
                debug!(filename = %self.filename, "no artifact in scan window, starting empty");
                return Ok(Snapshot::empty());
            };

            match self.read(artifact) {
                // superseded and garbage-collected between list and fetch
                Err(StoreError::Backend(BackendError::NotFound(_))) if attempt < LOAD_ATTEMPTS => {
                    debug!(artifact = %artifact.id, attempt, "artifact vanished during load, rescanning");
                }
                other => return other,
            }
        }
    }

    /// Publish `snapshot` if the live version is still `expected`.
    ///
    /// Returns the version of the new artifact.
    pub fn save(&self, snapshot: &Snapshot, expected: &Version) -> Result<Version, StoreError> {
        let before = self.scan()?;
        let actual = before.current_version();
        if &actual != expected {
            return Err(StoreError::Conflict {
                expected: expected.clone(),
                actual,
            });
        }

        let lineage = if snapshot.version() == expected {
            snapshot.successor_lineage(LINEAGE_DEPTH)
        } else {
            expected.id().map(|id| vec![id.to_string()]).unwrap_or_default()
        };
        let body = snapshot.to_artifact()?;
        let token = lineage::upload_token();
        let caption = lineage::caption(&summary(snapshot), &token, &lineage);

        let (posted, after) = match self.channel.upload(&body, &self.filename, &caption) {
            Ok(message) => {
                let posted = Posted {
                    id: message.id,
                    ordinal: message.ordinal,
                };
                match self.scan() {
                    Ok(after) => (posted, after),
                    Err(e) => {
                        // unverifiable: take it back rather than leave an unknown outcome behind
                        self.withdraw(&posted.id);
                        return Err(e);
                    }
                }
            }
            Err(e) => self.find_upload(&token, e)?,
        };

        match after.verdict(&posted.id) {
            Verdict::Committed => {
                self.collect_garbage(&after, posted.ordinal);
                info!(
                    version = %posted.id,
                    previous = %expected,
                    visitors = snapshot.unique_visitors(),
                    "published snapshot"
                );
                Ok(Version::of(posted.id))
            }
            Verdict::Lost => {
                self.withdraw(&posted.id);
                Err(StoreError::Conflict {
                    expected: expected.clone(),
                    actual: after.current_version(),
                })
            }
        }
    }

    /// An upload call failed, but the message may still have been posted (a
    /// timeout after the server accepted it). Look for it by its token so the
    /// normal verdict decides its fate; if it cannot be found the original
    /// error stands.
    fn find_upload(
        &self,
        token: &str,
        error: BackendError,
    ) -> Result<(Posted, Resolution), StoreError> {
        warn!(error = %error, "upload failed, checking whether it was posted");
        for attempt in 1..=FIND_UPLOAD_ATTEMPTS {
            match self.scan() {
                Ok(after) => {
                    let Some(artifact) = after.uploaded(token) else {
                        return Err(error.into());
                    };
                    warn!(artifact = %artifact.id, "upload was posted despite the error");
                    let posted = Posted {
                        id: artifact.id.clone(),
                        ordinal: artifact.ordinal,
                    };
                    return Ok((posted, after));
                }
                Err(e) => debug!(attempt, error = %e, "rescan after failed upload failed"),
            }
        }
        error!(error = %error, "could not tell whether the failed upload was posted");
        Err(error.into())
    }

    fn scan(&self) -> Result<Resolution, StoreError> {
        let messages = self.channel.list_recent(self.scan_window)?;
        let resolution = Resolution::from_messages(messages, &self.filename);
        debug!(artifacts = resolution.len(), "scanned channel");
        Ok(resolution)
    }

    fn read(&self, artifact: &Artifact) -> Result<Snapshot, StoreError> {
        let bytes = self.channel.fetch(&artifact.url)?;
        Snapshot::from_artifact(
            &bytes,
            Version::of(artifact.id.clone()),
            artifact.lineage.clone().unwrap_or_default(),
        )
        .map_err(|e| StoreError::Malformed {
            version: artifact.id.clone(),
            reason: e.to_string(),
        })
    }

    /// Delete superseded artifacts newest first, stopping at the first failure.
    ///
    /// An artifact that lost a race is only recognizable while the older
    /// sibling that beat it is still listed, so no artifact is removed while a
    /// newer superseded one remains.
    fn collect_garbage(&self, resolution: &Resolution, below: u64) {
        let stale: Vec<&Artifact> = resolution.older_than(below).collect();
        for artifact in stale.into_iter().rev() {
            match self.channel.delete(&artifact.id) {
                Ok(_) => debug!(artifact = %artifact.id, "deleted superseded artifact"),
                Err(e) => {
                    warn!(
                        artifact = %artifact.id,
                        error = %e,
                        "failed to delete superseded artifact, will retry on next save"
                    );
                    return;
                }
            }
        }
    }

    fn withdraw(&self, id: &str) {
        if let Err(e) = self.channel.delete(id) {
            warn!(artifact = %id, error = %e, "failed to withdraw losing artifact");
        }
    }
}

fn summary(snapshot: &Snapshot) -> String {
    format!(
        "📊 **Views Updated** - Total unique visitors: {}, total views: {}",
        snapshot.unique_visitors(),
        snapshot.total_views()
    )
}
