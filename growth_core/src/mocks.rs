//! Test helpers for growth_core.

use std::cell::RefCell;

use growth_traits::Journal;

/// Journal that keeps every record for later inspection.
#[derive(Debug, Default)]
pub struct RecordingJournal {
    events: RefCell<Vec<String>>,
    mails: RefCell<Vec<(String, String, String)>>,
}

impl RecordingJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    /// `(subject, recipient, body)` of every mail sent.
    pub fn mails(&self) -> Vec<(String, String, String)> {
        self.mails.borrow().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.events.borrow().iter().any(|e| e.contains(needle))
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
        self.mails.borrow_mut().clear();
    }
}

impl Journal for RecordingJournal {
    fn add_event(&self, text: &str) {
        self.events.borrow_mut().push(text.to_string());
    }

    fn send_mail(&self, subject: &str, recipient: &str, body: &str) {
        self.mails
            .borrow_mut()
            .push((subject.to_string(), recipient.to_string(), body.to_string()));
    }
}
