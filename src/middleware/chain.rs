//! Composition of named middlewares.

use std::sync::Arc;

use crate::handler::HttpHandler;
use crate::middleware::{apply_http, HttpMiddleware};

/// Applies a list of middlewares in order, as if they were listed on the router.
pub struct Chain {
    layers: Vec<Arc<dyn HttpMiddleware>>,
}

impl Chain {
    pub fn new(layers: Vec<Arc<dyn HttpMiddleware>>) -> Self {
        Self { layers }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl HttpMiddleware for Chain {
    fn wrap(&self, next: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler> {
        apply_http(&self.layers, next)
    }
}
