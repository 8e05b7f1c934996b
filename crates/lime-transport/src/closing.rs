//! Async closing hooks.
//!
//! Transports announce an imminent close before it proceeds so listeners
//! can run asynchronous cleanup. Rather than an event with deferral
//! tokens, this is a plain list of async hooks: `run` awaits every
//! registered hook before the close continues.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

type BoxedHook = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// An ordered list of async hooks awaited before a transport closes.
#[derive(Default)]
pub struct ClosingHooks {
    hooks: Mutex<Vec<BoxedHook>>,
}

impl ClosingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. Hooks run in registration order.
    pub fn register<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: BoxedHook = Box::new(move || Box::pin(hook()));
        self.hooks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(boxed);
    }

    /// Run every registered hook to completion, in order.
    pub async fn run(&self) {
        // Futures are constructed under the lock, awaited outside it.
        let futures: Vec<_> = {
            let hooks = self
                .hooks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            hooks.iter().map(|hook| hook()).collect()
        };
        for future in futures {
            future.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn hooks_run_in_registration_order() {
        let hooks = ClosingHooks::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            hooks.register(move || {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(i);
                }
            });
        }

        hooks.run().await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn run_awaits_async_work() {
        let hooks = ClosingHooks::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        hooks.register(move || {
            let c = Arc::clone(&c);
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        hooks.run().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_hook_list_is_a_noop() {
        ClosingHooks::new().run().await;
    }
}
