use std::sync::{Arc, Weak};

use serialgate_common::PortInfo;

/// Listener for serial port topology changes.
pub trait PortObserver: Send + Sync {
    fn on_port_added(&self, port: &PortInfo);

    fn on_port_removed(&self, port: &PortInfo);

    /// The enumeration service went away; every known port is forgotten.
    fn on_port_manager_connection_error(&self) {}
}

/// Non-owning list of observers, notified in registration order.
///
/// Observers are held weakly: dropping the last `Arc` unregisters implicitly.
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<Weak<dyn PortObserver>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: &Arc<dyn PortObserver>) {
        if !self.contains(observer) {
            self.observers.push(Arc::downgrade(observer));
        }
    }

    pub fn remove(&mut self, observer: &Arc<dyn PortObserver>) {
        let target = Arc::downgrade(observer);
        self.observers.retain(|o| !Weak::ptr_eq(o, &target));
    }

    pub fn contains(&self, observer: &Arc<dyn PortObserver>) -> bool {
        let target = Arc::downgrade(observer);
        self.observers.iter().any(|o| Weak::ptr_eq(o, &target))
    }

    pub fn len(&self) -> usize {
        self.observers.iter().filter(|o| o.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify_added(&mut self, port: &PortInfo) {
        self.for_each(|o| o.on_port_added(port));
    }

    pub fn notify_removed(&mut self, port: &PortInfo) {
        self.for_each(|o| o.on_port_removed(port));
    }

    pub fn notify_connection_error(&mut self) {
        self.for_each(|o| o.on_port_manager_connection_error());
    }

    fn for_each(&mut self, mut f: impl FnMut(&dyn PortObserver)) {
        self.observers.retain(|o| o.strong_count() > 0);
        for observer in self.observers.iter().filter_map(Weak::upgrade) {
            f(observer.as_ref());
        }
    }
}
