//! Completion callbacks for downloads and stacks.

use std::sync::{Arc, Weak};

use crate::download::Download;
use crate::error::TransportError;
use crate::manager::DownloadManager;

/// Receiver of download and stack completion events.
///
/// All hooks default to no-ops; implement the ones you care about.
///
/// Delegates are held weakly. Once the last `Arc` to a delegate is dropped,
/// pending events for it are discarded.
///
/// Hooks run on tokio worker threads, never while the manager holds its
/// internal lock, so calling back into the [`DownloadManager`] from a hook
/// is allowed.
///
/// A cancelled download gets no hook at all. Members of a stack must be
/// cancelled through [`DownloadManager::cancel_stack`]; cancelling one member
/// directly with [`Download::cancel`] leaves the stack waiting for it.
pub trait DownloadDelegate: Send + Sync {
    /// A download completed and its response body is available.
    ///
    /// Any HTTP response counts, check [`Download::status_code`] for the
    /// server's verdict.
    fn download_did_finish(&self, _download: &Download) {}

    /// A download failed at the transport level.
    fn download_did_fail(&self, _download: &Download, _error: &TransportError) {}

    /// Every download in `stack_name` has finished or failed.
    ///
    /// Sent exactly once per started stack, even when all members failed.
    /// Never sent for cancelled stacks.
    fn stack_did_finish(&self, _manager: &DownloadManager, _stack_name: &str) {}
}

pub(crate) type WeakDelegate = Weak<dyn DownloadDelegate>;

/// Something a delegate can be borrowed from when work is submitted.
///
/// Implemented for `Arc<D>` of a concrete delegate and for
/// `Weak<dyn DownloadDelegate>`, so callers that only hold a trait object can
/// pass `&Arc::downgrade(&shared)`.
pub trait DelegateHandle {
    fn downgrade_delegate(&self) -> Weak<dyn DownloadDelegate>;
}

impl<D: DownloadDelegate + 'static> DelegateHandle for Arc<D> {
    fn downgrade_delegate(&self) -> Weak<dyn DownloadDelegate> {
        let weak: Weak<D> = Arc::downgrade(self);
        weak
    }
}

impl DelegateHandle for Weak<dyn DownloadDelegate> {
    fn downgrade_delegate(&self) -> Weak<dyn DownloadDelegate> {
        Weak::clone(self)
    }
}
