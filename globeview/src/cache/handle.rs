//! Handles to cache entries

use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use image::RgbaImage;

use super::LoadError;
use crate::coord::TileAddress;

/// Output of a load, shared by every handle joined to it.
pub(crate) type LoadResult = Result<Arc<RgbaImage>, LoadError>;

/// A load future that any number of handles can await.
pub(crate) type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

#[derive(Clone)]
enum HandleState {
    Ready(Arc<RgbaImage>),
    Pending(SharedLoad),
}

/// Handle returned by [`TileCache::request_tile`](super::TileCache::request_tile).
///
/// Handles for the same in-flight load share one future; awaiting any of
/// them never starts another fetch.
#[derive(Clone)]
pub struct TileHandle {
    address: TileAddress,
    state: HandleState,
}

impl TileHandle {
    pub(crate) fn ready(address: TileAddress, image: Arc<RgbaImage>) -> Self {
        Self {
            address,
            state: HandleState::Ready(image),
        }
    }

    pub(crate) fn pending(address: TileAddress, load: SharedLoad) -> Self {
        Self {
            address,
            state: HandleState::Pending(load),
        }
    }

    /// Normalized address this handle refers to.
    pub fn address(&self) -> TileAddress {
        self.address
    }

    /// The image, if the load has already finished successfully.
    pub fn try_get(&self) -> Option<Arc<RgbaImage>> {
        match &self.state {
            HandleState::Ready(image) => Some(Arc::clone(image)),
            HandleState::Pending(load) => match load.peek() {
                Some(Ok(image)) => Some(Arc::clone(image)),
                _ => None,
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        self.try_get().is_some()
    }

    /// True when both handles are bound to the same load.
    pub fn shares_load_with(&self, other: &TileHandle) -> bool {
        match (&self.state, &other.state) {
            (HandleState::Pending(a), HandleState::Pending(b)) => Shared::ptr_eq(a, b),
            (HandleState::Ready(a), HandleState::Ready(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Waits for the load to finish.
    pub async fn wait(self) -> Result<Arc<RgbaImage>, LoadError> {
        match self.state {
            HandleState::Ready(image) => Ok(image),
            HandleState::Pending(load) => load.await,
        }
    }
}

impl std::fmt::Debug for TileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            HandleState::Ready(_) => "ready",
            HandleState::Pending(_) => "pending",
        };
        f.debug_struct("TileHandle")
            .field("address", &self.address)
            .field("state", &state)
            .finish()
    }
}
