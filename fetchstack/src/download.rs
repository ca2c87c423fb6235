//! A single HTTP download and its lifecycle.
//!
//! A [`Download`] moves through three phases:
//!
//! ```text
//! Pending ──perform──► Running ──transport done──► Finished
//!    │                    │
//!    └──────cancel────────┴──────────────────────► Finished
//! ```
//!
//! `Finished` is entered exactly once. After that the download's state is
//! frozen: late body chunks are dropped and a second outcome is ignored.
//! Reusing a finished download requires [`Download::fresh_copy`].
//!
//! `Download` is a handle. Cloning it shares the same underlying transfer,
//! which is how the manager, the caller and completion hooks all observe the
//! same state.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use reqwest::Url;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::admission::Admission;
use crate::delegate::{DelegateHandle, DownloadDelegate, WeakDelegate};
use crate::error::{DownloadError, TransportError};
use crate::request::DownloadRequest;
use crate::transport::{BodySink, Transport};

/// Opaque caller-owned value attached to a download.
pub type Context = Arc<dyn Any + Send + Sync>;

/// Hook run after a download settles and its delegate has been told.
pub(crate) type SettledHook = Box<dyn FnOnce() + Send>;

/// Lifecycle phase of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, not yet submitted.
    Pending,
    /// Submitted; waiting for a slot or talking to the transport.
    Running,
    /// Completed, failed or cancelled.
    Finished,
}

struct DownloadState {
    phase: Phase,
    data: BytesMut,
    error: Option<TransportError>,
    status_code: Option<u16>,
    context: Option<Context>,
    stack_name: Option<String>,
    delegate: Option<WeakDelegate>,
    cancellation: CancellationToken,
}

struct DownloadInner {
    request: DownloadRequest,
    state: Mutex<DownloadState>,
}

/// Handle to one HTTP download.
#[derive(Clone)]
pub struct Download {
    inner: Arc<DownloadInner>,
}

impl Download {
    /// Create a pending download for `request`.
    pub fn new(request: DownloadRequest) -> Self {
        Self::build(request, None)
    }

    /// Create a pending download carrying a context value.
    pub fn with_context<T: Any + Send + Sync>(request: DownloadRequest, context: T) -> Self {
        Self::build(request, Some(Arc::new(context)))
    }

    /// Create a GET download from a URL string.
    pub fn from_url_str(url: &str) -> Result<Self, DownloadError> {
        DownloadRequest::parse(url).map(Self::new)
    }

    /// Create a GET download from a URL string, carrying a context value.
    pub fn from_url_str_with_context<T: Any + Send + Sync>(
        url: &str,
        context: T,
    ) -> Result<Self, DownloadError> {
        DownloadRequest::parse(url).map(|request| Self::with_context(request, context))
    }

    /// Create a GET download from a parsed URL.
    pub fn from_url(url: Url) -> Self {
        Self::new(DownloadRequest::new(url))
    }

    /// Create a GET download from a parsed URL, carrying a context value.
    pub fn from_url_with_context<T: Any + Send + Sync>(url: Url, context: T) -> Self {
        Self::with_context(DownloadRequest::new(url), context)
    }

    fn build(request: DownloadRequest, context: Option<Context>) -> Self {
        Self {
            inner: Arc::new(DownloadInner {
                request,
                state: Mutex::new(DownloadState {
                    phase: Phase::Pending,
                    data: BytesMut::new(),
                    error: None,
                    status_code: None,
                    context,
                    stack_name: None,
                    delegate: None,
                    cancellation: CancellationToken::new(),
                }),
            }),
        }
    }

    /// A new pending download for the same request.
    ///
    /// Only the request is copied; response data, error, status, stack
    /// membership and context all start empty.
    pub fn fresh_copy(&self) -> Self {
        Self::new(self.inner.request.clone())
    }

    /// Whether two handles refer to the same download.
    pub fn same(&self, other: &Download) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.inner.request
    }

    pub fn url(&self) -> &Url {
        self.inner.request.url()
    }

    /// Snapshot of the bytes received so far.
    ///
    /// Complete only once the download has finished.
    pub fn data(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.state.lock().data)
    }

    /// Response body decoded as UTF-8, replacing invalid sequences.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.inner.state.lock().data).into_owned()
    }

    /// Transport error, if the download failed.
    pub fn error(&self) -> Option<TransportError> {
        self.inner.state.lock().error.clone()
    }

    /// HTTP status code, once a response has been received.
    pub fn status_code(&self) -> Option<u16> {
        self.inner.state.lock().status_code
    }

    /// The stack this download was performed in, if any.
    pub fn stack_name(&self) -> Option<String> {
        self.inner.state.lock().stack_name.clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// True once completed, failed or cancelled.
    pub fn is_finished(&self) -> bool {
        self.phase() == Phase::Finished
    }

    pub fn is_started(&self) -> bool {
        self.phase() != Phase::Pending
    }

    /// Finished with a response and no transport error.
    pub fn is_success(&self) -> bool {
        let state = self.inner.state.lock();
        state.phase == Phase::Finished && state.error.is_none() && state.status_code.is_some()
    }

    /// The context value, if one is set and has type `T`.
    pub fn context<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let context = self.inner.state.lock().context.clone()?;
        context.downcast::<T>().ok()
    }

    /// Replace the context value.
    pub fn set_context<T: Any + Send + Sync>(&self, context: T) {
        self.inner.state.lock().context = Some(Arc::new(context));
    }

    pub fn clear_context(&self) {
        self.inner.state.lock().context = None;
    }

    /// Start downloading on `runtime`, reporting to `delegate`.
    ///
    /// Returns immediately; results arrive through the delegate. The delegate
    /// is held weakly.
    pub fn perform<H: DelegateHandle>(
        &self,
        delegate: &H,
        transport: Arc<dyn Transport>,
        runtime: &Handle,
    ) -> Result<(), DownloadError> {
        self.claim(None, delegate.downgrade_delegate())?;
        self.launch(transport, runtime, Arc::new(Admission::unlimited()), None);
        Ok(())
    }

    /// Cancel the download.
    ///
    /// Marks it finished without an error and aborts the request if one is
    /// in flight. No delegate hook fires. Does nothing if already finished.
    ///
    /// A member of a stack cancelled this way never settles, so its stack
    /// stays in flight. Use [`DownloadManager::cancel_stack`](crate::DownloadManager::cancel_stack)
    /// for stack members.
    pub fn cancel(&self) {
        let cancellation = {
            let mut state = self.inner.state.lock();
            if state.phase == Phase::Finished {
                return;
            }
            state.phase = Phase::Finished;
            state.cancellation.clone()
        };

        debug!(url = %self.url(), "Download cancelled");
        cancellation.cancel();
    }

    /// Move from `Pending` to `Running`, recording stack tag and delegate.
    pub(crate) fn claim(
        &self,
        stack_name: Option<&str>,
        delegate: WeakDelegate,
    ) -> Result<(), DownloadError> {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Pending {
            return Err(DownloadError::AlreadyStarted);
        }
        state.phase = Phase::Running;
        state.stack_name = stack_name.map(str::to_string);
        state.delegate = Some(delegate);
        Ok(())
    }

    /// Undo a [`claim`](Self::claim) that was never launched.
    pub(crate) fn release_claim(&self) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Running {
            state.phase = Phase::Pending;
            state.stack_name = None;
            state.delegate = None;
        }
    }

    /// Spawn the transfer task for a claimed download.
    pub(crate) fn launch(
        &self,
        transport: Arc<dyn Transport>,
        runtime: &Handle,
        admission: Arc<Admission>,
        on_settled: Option<SettledHook>,
    ) {
        debug!(url = %self.url(), stack = ?self.stack_name(), "Starting download");
        runtime.spawn(self.clone().run(transport, admission, on_settled));
    }

    async fn run(
        self,
        transport: Arc<dyn Transport>,
        admission: Arc<Admission>,
        on_settled: Option<SettledHook>,
    ) {
        let cancellation = self.inner.state.lock().cancellation.clone();

        let outcome = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return,
            outcome = self.fetch(transport.as_ref(), &admission) => outcome,
        };

        if !self.settle(outcome) {
            return;
        }

        self.notify_delegate();

        if let Some(hook) = on_settled {
            hook();
        }
    }

    async fn fetch(
        &self,
        transport: &dyn Transport,
        admission: &Admission,
    ) -> Result<u16, TransportError> {
        let _slot = admission.acquire().await;
        let mut sink = BodyWriter { download: self };
        transport.send(&self.inner.request, &mut sink).await
    }

    /// Record the outcome. Returns false if the download was already finished.
    fn settle(&self, outcome: Result<u16, TransportError>) -> bool {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Finished {
            return false;
        }
        match outcome {
            Ok(status) => state.status_code = Some(status),
            Err(error) => state.error = Some(error),
        }
        state.phase = Phase::Finished;
        true
    }

    fn notify_delegate(&self) {
        let (delegate, error, status, bytes) = {
            let state = self.inner.state.lock();
            (
                state.delegate.clone(),
                state.error.clone(),
                state.status_code,
                state.data.len(),
            )
        };

        match &error {
            None => debug!(url = %self.url(), ?status, bytes, "Download finished"),
            Some(e) => warn!(url = %self.url(), error = %e, "Download failed"),
        }

        let Some(delegate) = delegate.and_then(|weak| weak.upgrade()) else {
            return;
        };

        match error {
            None => delegate.download_did_finish(self),
            Some(e) => delegate.download_did_fail(self, &e),
        }
    }

    fn append(&self, chunk: &[u8]) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Running {
            state.data.extend_from_slice(chunk);
        }
    }
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Download")
            .field("url", &self.inner.request.url().as_str())
            .field("phase", &state.phase)
            .field("stack_name", &state.stack_name)
            .field("status_code", &state.status_code)
            .field("error", &state.error)
            .field("bytes", &state.data.len())
            .finish()
    }
}

/// Appends transport chunks to the owning download.
struct BodyWriter<'a> {
    download: &'a Download,
}

impl BodySink for BodyWriter<'_> {
    fn data_received(&mut self, chunk: Bytes) {
        self.download.append(&chunk);
    }
}
