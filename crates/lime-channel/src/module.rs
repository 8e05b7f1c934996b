//! Channel modules and the per-kind pipeline.
//!
//! Modules observe and transform envelope traffic of one kind. The
//! pipeline applies them in registration order and short-circuits when a
//! module suppresses the envelope. Modules are registered before the
//! session is established; registration after the pump starts is
//! unsupported.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use lime_core::SessionState;

/// A hook into the send/receive path for envelopes of type `T`.
///
/// `on_sending` and `on_receiving` may pass the envelope through
/// (possibly transformed) or suppress it by returning `None`.
/// `on_state_changed` fires for every module of every kind before a
/// session state change completes.
#[async_trait]
pub trait ChannelModule<T: Send + 'static>: Send + Sync {
    fn on_state_changed(&self, _state: SessionState) {}

    async fn on_sending(&self, envelope: T) -> Option<T> {
        Some(envelope)
    }

    async fn on_receiving(&self, envelope: T) -> Option<T> {
        Some(envelope)
    }
}

/// The ordered module list for one envelope kind.
pub struct ModulePipeline<T: Send + 'static> {
    modules: RwLock<Vec<Arc<dyn ChannelModule<T>>>>,
}

impl<T: Send + 'static> Default for ModulePipeline<T> {
    fn default() -> Self {
        Self {
            modules: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Send + 'static> ModulePipeline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module. Order of registration is order of application.
    pub fn register(&self, module: Arc<dyn ChannelModule<T>>) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(module);
    }

    fn snapshot(&self) -> Vec<Arc<dyn ChannelModule<T>>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run the sending hooks in order; `None` as soon as one suppresses.
    pub async fn on_sending(&self, mut envelope: T) -> Option<T> {
        for module in self.snapshot() {
            envelope = module.on_sending(envelope).await?;
        }
        Some(envelope)
    }

    /// Run the receiving hooks in order; `None` as soon as one suppresses.
    pub async fn on_receiving(&self, mut envelope: T) -> Option<T> {
        for module in self.snapshot() {
            envelope = module.on_receiving(envelope).await?;
        }
        Some(envelope)
    }

    /// Notify every module of a state change, in registration order.
    pub fn notify_state_changed(&self, state: SessionState) {
        for module in self.snapshot() {
            module.on_state_changed(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct Tagger {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl ChannelModule<String> for Tagger {
        fn on_state_changed(&self, _state: SessionState) {
            self.log.lock().unwrap().push(self.tag);
        }

        async fn on_sending(&self, envelope: String) -> Option<String> {
            Some(format!("{envelope}+{}", self.tag))
        }
    }

    struct Dropper {
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ChannelModule<String> for Dropper {
        async fn on_sending(&self, _envelope: String) -> Option<String> {
            self.dropped.store(true, Ordering::SeqCst);
            None
        }
    }

    fn tagger(tag: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<Tagger> {
        Arc::new(Tagger {
            tag,
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn applies_modules_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ModulePipeline::new();
        pipeline.register(tagger("a", &log));
        pipeline.register(tagger("b", &log));

        let result = pipeline.on_sending("x".to_string()).await;
        assert_eq!(result.as_deref(), Some("x+a+b"));
    }

    #[tokio::test]
    async fn suppression_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dropped = Arc::new(AtomicBool::new(false));
        let pipeline = ModulePipeline::new();
        pipeline.register(Arc::new(Dropper {
            dropped: Arc::clone(&dropped),
        }));
        pipeline.register(tagger("late", &log));

        let result = pipeline.on_sending("x".to_string()).await;
        assert!(result.is_none());
        assert!(dropped.load(Ordering::SeqCst));
        // The later module never ran.
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn state_change_reaches_every_module_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ModulePipeline::new();
        pipeline.register(tagger("first", &log));
        pipeline.register(tagger("second", &log));

        pipeline.notify_state_changed(SessionState::Established);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn empty_pipeline_passes_through() {
        let pipeline: ModulePipeline<String> = ModulePipeline::new();
        assert_eq!(
            pipeline.on_receiving("x".to_string()).await.as_deref(),
            Some("x")
        );
    }
}
