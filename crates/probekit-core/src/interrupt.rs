//! Per-thread interruption flags
//!
//! A cooperative stand-in for thread interruption. Blocking waits in the
//! test kit check the flag of their own thread; the calling-thread
//! dispatcher records it while draining and re-signals it afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    static INTERRUPTED: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

/// Set the interruption flag of the current thread
pub fn interrupt_current() {
    INTERRUPTED.with(|flag| flag.store(true, Ordering::SeqCst));
}

/// Check the flag of the current thread without clearing it
pub fn is_interrupted() -> bool {
    INTERRUPTED.with(|flag| flag.load(Ordering::SeqCst))
}

/// Check and clear the flag of the current thread
pub fn take_interrupted() -> bool {
    INTERRUPTED.with(|flag| flag.swap(false, Ordering::SeqCst))
}

/// Handle used to interrupt a specific thread from elsewhere
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Handle for the current thread
    pub fn current() -> Self {
        Self {
            flag: INTERRUPTED.with(Arc::clone),
        }
    }

    /// Interrupt the thread this handle was taken on
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the owning thread's flag is set
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_set_and_take() {
        assert!(!is_interrupted());
        interrupt_current();
        assert!(is_interrupted());
        assert!(take_interrupted());
        assert!(!take_interrupted());
    }

    #[test]
    fn test_handle_interrupts_owning_thread_only() {
        let handle = InterruptHandle::current();

        std::thread::spawn(move || {
            assert!(!is_interrupted());
            handle.interrupt();
            assert!(!is_interrupted());
        })
        .join()
        .unwrap();

        assert!(take_interrupted());
    }
}
