//! Application state shared across request handlers.

use std::sync::Arc;

use crate::runtime::Engine;

pub(crate) struct AppState {
    pub(crate) engine: Arc<Engine>,
}
