//! Model providers: hand out typed models loaded from model archives.
//!
//! A provider asks the repository for the best archive of a key's base
//! project, opens it and builds the model with a [`ModelLoader`].
//! [`PoolingModelProvider`] pools instances per key;
//! [`SimpleModelProvider`] builds a fresh one on every call.

mod archive;
mod loader;
mod pooling;
mod settings;
mod simple;

pub use archive::ModelArchive;
pub use loader::{JsonModelLoader, ModelLoader};
pub use pooling::PoolingModelProvider;
pub use settings::{ExhaustedAction, PoolSettings, PoolStats};
pub use simple::SimpleModelProvider;

use crate::coordinates::{BasedName, ModelCoordinate};
use crate::error::Result;
use crate::repository::RepositoryEvent;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lends models of type `M` for keys of type `K`.
///
/// `acquire_model` returns `None` whenever no model is available, whatever
/// the reason. Every acquired model should be handed back with
/// `release_model`.
pub trait ModelProvider<K, M>: Send + Sync {
    fn acquire_model(&self, key: &K) -> Option<Arc<M>>;
    fn release_model(&self, model: Arc<M>);
    fn open(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// Keys a provider can serve: a based name usable as a map key.
pub trait PoolKey: BasedName + Clone + Eq + Hash + Display + Send + Sync + 'static {}

impl<T> PoolKey for T where T: BasedName + Clone + Eq + Hash + Display + Send + Sync + 'static {}

/// Reacts to archives replaced in the repository.
pub trait ArchiveInstallListener: Send + Sync {
    fn on_model_archive_installed(&self, mc: &ModelCoordinate);
}

/// Forward repository events to `listener` until the repository or the
/// listener goes away.
pub fn spawn_event_listener<L>(
    handle: &Handle,
    listener: &Arc<L>,
    mut events: broadcast::Receiver<RepositoryEvent>,
) -> JoinHandle<()>
where
    L: ArchiveInstallListener + 'static,
{
    let listener: Weak<L> = Arc::downgrade(listener);
    handle.spawn(async move {
        loop {
            match events.recv().await {
                Ok(RepositoryEvent::ModelArchiveInstalled(mc)) => {
                    let Some(listener) = listener.upgrade() else {
                        break;
                    };
                    listener.on_model_archive_installed(&mc);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!("Missed {} repository events", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Repository event listener stopped");
    })
}
