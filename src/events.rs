use std::sync::{Arc, Mutex, PoisonError};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Callbacks registered for one kind of notification.
///
/// `emit` snapshots the list and calls the listeners without holding the
/// lock, so a listener may register or clear listeners itself.
pub struct Listeners<T> {
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        self.lock().push(Arc::new(listener));
    }

    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self.lock().clone();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Listener<T>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_reaches_every_listener() {
        let listeners = Listeners::<usize>::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = Arc::clone(&total);
            listeners.add(move |n| {
                total.fetch_add(*n, Ordering::SeqCst);
            });
        }

        listeners.emit(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn listener_may_clear_the_list_while_emitting() {
        let listeners = Arc::new(Listeners::<()>::new());
        let inner = Arc::clone(&listeners);
        listeners.add(move |_| inner.clear());

        listeners.emit(&());
        assert_eq!(listeners.len(), 0);
    }
}
