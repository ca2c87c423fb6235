//! Download manager: named stacks and queues of downloads.
//!
//! The [`DownloadManager`] owns two name-keyed tables:
//!
//! - **queues**: downloads added with [`add_to_queue`](DownloadManager::add_to_queue)
//!   wait here, unstarted, until the queue is performed.
//! - **stacks**: batches currently in flight. Each entry tracks its members
//!   and how many of them have not settled yet.
//!
//! ```text
//!  add_to_queue ──► queues["Q"] ──perform_queue──┐
//!                                                ▼
//!  perform_downloads ─────────────────────► stacks["Q"] ──last member settles──► stack_did_finish
//!                                                │
//!                                  cancel_stack ─┴──► entry removed, members cancelled
//! ```
//!
//! Both tables sit behind one mutex. Each settled member decrements its
//! stack's count under that lock, so exactly one completion observes zero
//! and fires the aggregate notification. Stacks carry a unique id so that a
//! member of a cancelled stack cannot decrement a newer stack that reuses the
//! name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::admission::Admission;
use crate::config::ManagerConfig;
use crate::delegate::{DelegateHandle, DownloadDelegate, WeakDelegate};
use crate::download::{Download, SettledHook};
use crate::error::{DownloadError, TransportError};
use crate::transport::{ReqwestTransport, Transport};

/// Source of unique stack ids.
static STACK_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_stack_id() -> u64 {
    STACK_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Point-in-time progress of an in-flight stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackStatus {
    pub name: String,
    /// Members the stack was started with.
    pub total: usize,
    /// Members that have not settled yet.
    pub remaining: usize,
}

impl StackStatus {
    pub fn completed(&self) -> usize {
        self.total.saturating_sub(self.remaining)
    }

    /// Progress as a fraction from 0.0 to 1.0.
    pub fn progress_fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed() as f64 / self.total as f64
    }
}

struct StackEntry {
    id: u64,
    downloads: Vec<Download>,
    remaining: usize,
    delegate: WeakDelegate,
}

#[derive(Default)]
struct Tables {
    queues: HashMap<String, Vec<Download>>,
    stacks: HashMap<String, StackEntry>,
}

/// Outcome of registering a batch, acted on after the lock is released.
enum Registered {
    /// A stack entry was created; its members still have to be launched.
    Stack {
        name: String,
        id: u64,
        downloads: Vec<Download>,
    },
    /// The batch had no members and is finished already.
    Empty { name: String, delegate: WeakDelegate },
}

struct ManagerInner {
    transport: Arc<dyn Transport>,
    runtime: Handle,
    admission: Arc<Admission>,
    tables: Mutex<Tables>,
}

/// Coordinator for single downloads, stacks and queues.
///
/// Cheap to clone; clones share the same tables. Construct one per
/// application and pass it where needed.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

impl DownloadManager {
    /// Creates a manager over `transport`, spawning downloads on `runtime`.
    pub fn new(transport: Arc<dyn Transport>, runtime: Handle, config: &ManagerConfig) -> Self {
        debug!(
            max_active = ?config.max_active_downloads,
            "Creating download manager"
        );

        Self {
            inner: Arc::new(ManagerInner {
                transport,
                runtime,
                admission: Arc::new(Admission::new(config.max_active_downloads)),
                tables: Mutex::new(Tables::default()),
            }),
        }
    }

    /// Creates a manager with a [`ReqwestTransport`] built from `config`.
    pub fn with_reqwest(config: &ManagerConfig, runtime: Handle) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(&config.transport)?;
        Ok(Self::new(Arc::new(transport), runtime, config))
    }

    /// Performs a single download outside any stack.
    ///
    /// Only per-download hooks fire; there is no aggregate notification.
    pub fn perform_download<H: DelegateHandle>(
        &self,
        download: &Download,
        delegate: &H,
    ) -> Result<(), DownloadError> {
        download.claim(None, delegate.downgrade_delegate())?;
        download.launch(
            Arc::clone(&self.inner.transport),
            &self.inner.runtime,
            Arc::clone(&self.inner.admission),
            None,
        );
        Ok(())
    }

    /// Performs `downloads` as one stack named `stack_name`.
    ///
    /// Fails with [`DownloadError::DuplicateStack`] if a stack of that name is
    /// still in flight, and with [`DownloadError::AlreadyStarted`] if any
    /// download is not pending or appears twice. Either way nothing starts.
    ///
    /// Once every member has finished or failed, the delegate's
    /// [`stack_did_finish`](DownloadDelegate::stack_did_finish) fires once.
    /// An empty batch fires it right away.
    pub fn perform_downloads<H, I>(
        &self,
        downloads: I,
        delegate: &H,
        stack_name: &str,
    ) -> Result<(), DownloadError>
    where
        H: DelegateHandle,
        I: IntoIterator<Item = Download>,
    {
        let downloads: Vec<Download> = downloads.into_iter().collect();
        let registered = {
            let mut tables = self.inner.tables.lock();
            register_stack(&mut tables, stack_name, downloads, delegate.downgrade_delegate())?
        };
        self.start_registered(registered);
        Ok(())
    }

    /// Adds a download to the named queue without starting it.
    ///
    /// Downloads added while the queue is being performed are kept for the
    /// next [`perform_queue`](Self::perform_queue).
    pub fn add_to_queue(&self, download: Download, queue_name: &str) -> Result<(), DownloadError> {
        if download.is_started() {
            return Err(DownloadError::AlreadyStarted);
        }

        let mut tables = self.inner.tables.lock();
        let queue = tables.queues.entry(queue_name.to_string()).or_default();
        queue.push(download);
        debug!(queue = %queue_name, queued = queue.len(), "Download queued");
        Ok(())
    }

    /// Performs everything in the named queue as a stack of the same name.
    ///
    /// The queue is emptied and may be refilled immediately. An empty or
    /// unknown queue is a no-op. If a stack with the queue's name is still in
    /// flight this fails with [`DownloadError::DuplicateStack`] and the queue
    /// keeps its contents.
    ///
    /// Queued downloads that were started or cancelled since they were added
    /// are dropped from the queue with a warning; the rest are performed. A
    /// queue left with nothing pending is emptied without starting a stack.
    pub fn perform_queue<H: DelegateHandle>(
        &self,
        queue_name: &str,
        delegate: &H,
    ) -> Result<(), DownloadError> {
        let registered = {
            let mut tables = self.inner.tables.lock();

            let is_empty = tables.queues.get(queue_name).map_or(true, Vec::is_empty);
            if is_empty {
                tables.queues.remove(queue_name);
                debug!(queue = %queue_name, "Nothing queued");
                return Ok(());
            }

            if tables.stacks.contains_key(queue_name) {
                warn!(queue = %queue_name, "Queue not performed: stack already in flight");
                return Err(DownloadError::DuplicateStack {
                    name: queue_name.to_string(),
                });
            }

            let queued = tables.queues.remove(queue_name).unwrap_or_default();
            let delegate = delegate.downgrade_delegate();
            let claimed = claim_available(queued, queue_name, &delegate);
            if claimed.is_empty() {
                debug!(queue = %queue_name, "Nothing pending in queue");
                return Ok(());
            }

            insert_stack(&mut tables, queue_name, claimed, delegate)
        };

        self.start_registered(registered);
        Ok(())
    }

    /// Cancels every download in the named stack.
    ///
    /// The stack's bookkeeping is removed before its members are cancelled,
    /// and no aggregate notification is sent. Returns `false` if no such
    /// stack is in flight.
    pub fn cancel_stack(&self, stack_name: &str) -> bool {
        let entry = self.inner.tables.lock().stacks.remove(stack_name);
        let Some(entry) = entry else {
            debug!(stack = %stack_name, "No stack to cancel");
            return false;
        };

        info!(
            stack = %stack_name,
            members = entry.downloads.len(),
            remaining = entry.remaining,
            "Cancelling stack"
        );
        for download in &entry.downloads {
            download.cancel();
        }
        true
    }

    /// Snapshot of the downloads in an in-flight stack, in submission order.
    pub fn downloads_in_stack(&self, stack_name: &str) -> Vec<Download> {
        self.inner
            .tables
            .lock()
            .stacks
            .get(stack_name)
            .map(|entry| entry.downloads.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the downloads waiting in a queue, in insertion order.
    pub fn downloads_in_queue(&self, queue_name: &str) -> Vec<Download> {
        self.inner
            .tables
            .lock()
            .queues
            .get(queue_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Names of stacks currently in flight, sorted.
    pub fn stack_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.tables.lock().stacks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of non-empty queues, sorted.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.tables.lock().queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Progress of an in-flight stack.
    pub fn stack_status(&self, stack_name: &str) -> Option<StackStatus> {
        self.inner
            .tables
            .lock()
            .stacks
            .get(stack_name)
            .map(|entry| StackStatus {
                name: stack_name.to_string(),
                total: entry.downloads.len(),
                remaining: entry.remaining,
            })
    }

    /// Downloads currently holding a transport slot.
    pub fn active_downloads(&self) -> usize {
        self.inner.admission.in_flight()
    }

    /// Configured limit on active downloads, if any.
    pub fn max_active_downloads(&self) -> Option<usize> {
        self.inner.admission.limit()
    }

    fn start_registered(&self, registered: Registered) {
        match registered {
            Registered::Empty { name, delegate } => {
                self.notify_stack_finished(&name, &delegate);
            }
            Registered::Stack {
                name,
                id,
                downloads,
            } => {
                for download in &downloads {
                    download.launch(
                        Arc::clone(&self.inner.transport),
                        &self.inner.runtime,
                        Arc::clone(&self.inner.admission),
                        Some(self.settled_hook(&name, id)),
                    );
                }
            }
        }
    }

    /// Hook a stack member runs once it has settled.
    ///
    /// Holds the manager weakly so in-flight downloads don't keep it alive.
    fn settled_hook(&self, stack_name: &str, id: u64) -> SettledHook {
        let manager: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let stack_name = stack_name.to_string();
        Box::new(move || {
            if let Some(inner) = manager.upgrade() {
                DownloadManager { inner }.member_settled(&stack_name, id);
            }
        })
    }

    /// Account for one settled member of stack `id`.
    fn member_settled(&self, stack_name: &str, id: u64) {
        let finished = {
            let mut tables = self.inner.tables.lock();
            match tables.stacks.get_mut(stack_name) {
                Some(entry) if entry.id == id => {
                    entry.remaining = entry.remaining.saturating_sub(1);
                    if entry.remaining == 0 {
                        tables.stacks.remove(stack_name).map(|entry| entry.delegate)
                    } else {
                        None
                    }
                }
                _ => {
                    debug!(stack = %stack_name, "Settled member of a stack no longer tracked");
                    None
                }
            }
        };

        if let Some(delegate) = finished {
            self.notify_stack_finished(stack_name, &delegate);
        }
    }

    fn notify_stack_finished(&self, stack_name: &str, delegate: &WeakDelegate) {
        info!(stack = %stack_name, "Stack finished");
        if let Some(delegate) = delegate.upgrade() {
            delegate.stack_did_finish(self, stack_name);
        }
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.inner.tables.lock();
        f.debug_struct("DownloadManager")
            .field("stacks", &tables.stacks.len())
            .field("queues", &tables.queues.len())
            .field("max_active", &self.inner.admission.limit())
            .finish()
    }
}

/// Validate and register a batch. Called with the table lock held.
///
/// All-or-nothing: on error no download has been claimed and no entry
/// exists.
fn register_stack(
    tables: &mut Tables,
    stack_name: &str,
    downloads: Vec<Download>,
    delegate: WeakDelegate,
) -> Result<Registered, DownloadError> {
    if tables.stacks.contains_key(stack_name) {
        warn!(stack = %stack_name, "Rejected batch: stack already in flight");
        return Err(DownloadError::DuplicateStack {
            name: stack_name.to_string(),
        });
    }

    if downloads.is_empty() {
        return Ok(Registered::Empty {
            name: stack_name.to_string(),
            delegate,
        });
    }

    claim_all(&downloads, stack_name, &delegate)?;
    Ok(insert_stack(tables, stack_name, downloads, delegate))
}

/// Create the entry for a batch whose members are all claimed.
fn insert_stack(
    tables: &mut Tables,
    stack_name: &str,
    downloads: Vec<Download>,
    delegate: WeakDelegate,
) -> Registered {
    let id = next_stack_id();
    info!(stack = %stack_name, members = downloads.len(), "Starting stack");
    tables.stacks.insert(
        stack_name.to_string(),
        StackEntry {
            id,
            downloads: downloads.clone(),
            remaining: downloads.len(),
            delegate,
        },
    );

    Registered::Stack {
        name: stack_name.to_string(),
        id,
        downloads,
    }
}

/// Claim every download for the stack, rolling back on the first failure.
fn claim_all(
    downloads: &[Download],
    stack_name: &str,
    delegate: &WeakDelegate,
) -> Result<(), DownloadError> {
    for (index, download) in downloads.iter().enumerate() {
        let repeated = downloads[..index].iter().any(|d| d.same(download));
        let claimed = if repeated {
            Err(DownloadError::AlreadyStarted)
        } else {
            download.claim(Some(stack_name), delegate.clone())
        };

        if let Err(e) = claimed {
            warn!(stack = %stack_name, url = %download.url(), "Rejected batch: download already started");
            for earlier in &downloads[..index] {
                earlier.release_claim();
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Claim whatever is still pending, skipping started and repeated downloads.
fn claim_available(
    downloads: Vec<Download>,
    stack_name: &str,
    delegate: &WeakDelegate,
) -> Vec<Download> {
    let mut claimed: Vec<Download> = Vec::with_capacity(downloads.len());
    for download in downloads {
        if claimed.iter().any(|d| d.same(&download)) {
            warn!(queue = %stack_name, url = %download.url(), "Dropped repeated queue entry");
            continue;
        }
        match download.claim(Some(stack_name), delegate.clone()) {
            Ok(()) => claimed.push(download),
            Err(_) => {
                warn!(queue = %stack_name, url = %download.url(), "Dropped queued download that is no longer pending");
            }
        }
    }
    claimed
}
