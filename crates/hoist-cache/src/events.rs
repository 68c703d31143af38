//! Progress hooks for downloads. The cache never owns a UI; callers that
//! want progress bars implement this and hand it in.

/// Callbacks fired around each network download.
///
/// Methods default to no-ops so implementors pick what they care about.
pub trait FetchEvents: Send + Sync {
    /// A download started. `length` is the Content-Length when the server
    /// sent one.
    fn started(&self, _url: &str, _length: Option<u64>) {}

    /// Bytes arrived. `total` is the running byte count, not a delta.
    fn progress(&self, _url: &str, _total: u64) {}

    /// The download completed and the file is visible in the cache.
    fn finished(&self, _url: &str) {}

    /// The download failed after exhausting retries.
    fn failed(&self, _url: &str, _message: &str) {}
}

/// The default listener: ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl FetchEvents for NoEvents {}
