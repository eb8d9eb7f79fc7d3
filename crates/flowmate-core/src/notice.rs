//! User-facing notices
//!
//! Operations queue success, error and info messages here; the CLI drains
//! and prints them. A single loading slot tracks long-running work such as
//! resolving a share link.

use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Queue of pending notices plus the current loading message
#[derive(Debug, Default)]
pub struct Notices {
    queue: RefCell<Vec<Notice>>,
    loading: RefCell<Option<String>>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: NoticeLevel, message: impl Into<String>) {
        self.queue.borrow_mut().push(Notice {
            level,
            message: message.into(),
        });
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(NoticeLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(NoticeLevel::Error, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(NoticeLevel::Info, message);
    }

    pub fn show_loading(&self, message: impl Into<String>) {
        *self.loading.borrow_mut() = Some(message.into());
    }

    pub fn clear_loading(&self) {
        self.loading.borrow_mut().take();
    }

    pub fn is_loading(&self) -> bool {
        self.loading.borrow().is_some()
    }

    pub fn loading_message(&self) -> Option<String> {
        self.loading.borrow().clone()
    }

    /// Take every queued notice, oldest first
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }
}
