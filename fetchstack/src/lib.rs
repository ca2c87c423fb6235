//! fetchstack - concurrent HTTP downloads grouped into named stacks.
//!
//! A [`DownloadManager`] performs HTTP downloads concurrently and groups them
//! into named **stacks**. Each download reports to its [`DownloadDelegate`]
//! when it finishes or fails, and the delegate hears once more when every
//! download in a stack is done, whatever the individual outcomes.
//!
//! **Queues** collect downloads without starting them; performing a queue
//! releases its contents as a stack of the same name.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fetchstack::{Download, DownloadDelegate, DownloadManager, ManagerConfig};
//!
//! struct Printer;
//!
//! impl DownloadDelegate for Printer {
//!     fn download_did_finish(&self, download: &Download) {
//!         println!("{} -> {:?}", download.url(), download.status_code());
//!     }
//!
//!     fn stack_did_finish(&self, _manager: &DownloadManager, stack_name: &str) {
//!         println!("stack {} done", stack_name);
//!     }
//! }
//!
//! let manager = DownloadManager::with_reqwest(&ManagerConfig::default(), runtime.handle().clone())?;
//! let printer = Arc::new(Printer);
//!
//! manager.add_to_queue(Download::from_url_str("https://example.com/a")?, "feeds")?;
//! manager.add_to_queue(Download::from_url_str("https://example.com/b")?, "feeds")?;
//! manager.perform_queue("feeds", &printer)?;
//! ```

mod admission;
pub mod config;
pub mod delegate;
pub mod download;
pub mod error;
pub mod logging;
pub mod manager;
pub mod request;
pub mod transport;

pub use config::{ConfigError, ManagerConfig, TransportConfig};
pub use delegate::{DelegateHandle, DownloadDelegate};
pub use download::{Context, Download, Phase};
pub use error::{DownloadError, TransportError};
pub use manager::{DownloadManager, StackStatus};
pub use request::DownloadRequest;
pub use transport::{BodySink, BoxFuture, ReqwestTransport, Transport};
