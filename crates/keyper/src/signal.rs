use std::fmt;
use std::sync::{Arc, Mutex, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

/// A synchronous observer registry.
///
/// Listeners are invoked in attach order, during the emission, outside the
/// registry lock — so a listener may attach, detach, or emit again without
/// deadlocking. Listener changes made during an emission take effect from
/// the next emission.
pub struct Signal<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Attaches a listener. The returned guard detaches it when dropped (or
    /// explicitly via [`SignalGuard::detach`]).
    pub fn attach(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> SignalGuard
    where
        T: 'static,
    {
        let id = {
            let mut registry = self.registry.lock().unwrap();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push((id, Arc::new(listener)));
            id
        };

        let registry = Arc::downgrade(&self.registry);
        SignalGuard {
            detach: Some(Box::new(move || {
                if let Some(registry) = Weak::upgrade(&registry) {
                    registry
                        .lock()
                        .unwrap()
                        .listeners
                        .retain(|(listener_id, _)| *listener_id != id);
                }
            })),
        }
    }

    /// Invokes every attached listener, synchronously and in attach order.
    pub fn emit(&self, value: &T) {
        let listeners: Vec<Listener<T>> = {
            let registry = self.registry.lock().unwrap();
            registry
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect()
        };
        for listener in listeners {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().unwrap().listeners.len()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Detaches its listener on drop.
pub struct SignalGuard {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SignalGuard {
    pub fn detach(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for SignalGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalGuard").finish_non_exhaustive()
    }
}
