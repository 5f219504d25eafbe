use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::registry::{ClientSocket, SocketError};

/// In-memory socket used by unit tests
#[derive(Clone, Default)]
pub struct MockSocket {
    open: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MockSocket {
    pub fn open() -> Self {
        let socket = Self::default();
        socket.open.store(true, Ordering::SeqCst);
        socket
    }

    pub fn closed() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let socket = Self::open();
        socket.fail_writes.store(true, Ordering::SeqCst);
        socket
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl ClientSocket for MockSocket {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send_text(&self, text: String) -> Result<(), SocketError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SocketError::Rejected("broken pipe".to_string()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }
}
