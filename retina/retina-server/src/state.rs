//! Shared request state.

use std::sync::Arc;

use retina_inference::Classify;

/// State cloned into every handler.
///
/// Holds the classifier loaded at startup; it is never replaced or mutated.
#[derive(Clone)]
pub struct AppState {
    classifier: Arc<dyn Classify>,
}

impl AppState {
    /// Wraps a loaded classifier.
    #[must_use]
    pub fn new(classifier: Arc<dyn Classify>) -> Self {
        Self { classifier }
    }

    /// The shared classifier.
    #[must_use]
    pub fn classifier(&self) -> Arc<dyn Classify> {
        Arc::clone(&self.classifier)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
