//! Model archive repository: Maven-style local layout, remote transfers,
//! download de-duplication and installation events.

mod download;
pub mod layout;
#[allow(clippy::module_inception)]
mod repository;
mod retry;
mod transport;

pub use download::{artifact_url, DownloadManager};
pub use repository::{ModelArchiveRepository, ModelRepository, RepositoryEvent};
pub use retry::{retry_async, RetryConfig};
pub use transport::{transport_for, FileTransport, HttpTransport, Progress, Transport};
