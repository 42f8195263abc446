//! Experiment journal implementations.
//!
//! The optimizer reports every transition through `growth_traits::Journal`.
//! Delivery is fire-and-forget: a journal never fails the cycle.

use crossbeam_channel::{Receiver, Sender, unbounded};
use growth_traits::Journal;
use serde::Serialize;

/// One journal record as seen by a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JournalEntry {
    Event {
        unit: String,
        text: String,
    },
    Mail {
        unit: String,
        subject: String,
        recipient: String,
        body: String,
    },
}

impl JournalEntry {
    pub fn unit(&self) -> &str {
        match self {
            Self::Event { unit, .. } | Self::Mail { unit, .. } => unit,
        }
    }
}

/// Emits journal records as `tracing` events on target `journal`.
#[derive(Debug, Clone)]
pub struct TracingJournal {
    unit: String,
}

impl TracingJournal {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }
}

impl Journal for TracingJournal {
    fn add_event(&self, text: &str) {
        tracing::info!(target: "journal", unit = %self.unit, "{text}");
    }

    fn send_mail(&self, subject: &str, recipient: &str, body: &str) {
        tracing::info!(target: "journal", unit = %self.unit, recipient, subject, "mail: {body}");
    }
}

/// Pushes journal records to a consumer thread.
///
/// A dropped receiver silently discards records.
#[derive(Debug, Clone)]
pub struct ChannelJournal {
    unit: String,
    tx: Sender<JournalEntry>,
}

impl ChannelJournal {
    pub fn new(unit: impl Into<String>) -> (Self, Receiver<JournalEntry>) {
        let (tx, rx) = unbounded();
        (Self { unit: unit.into(), tx }, rx)
    }

    /// Another unit's journal feeding the same consumer.
    pub fn for_unit(&self, unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            tx: self.tx.clone(),
        }
    }
}

impl Journal for ChannelJournal {
    fn add_event(&self, text: &str) {
        let _ = self.tx.send(JournalEntry::Event {
            unit: self.unit.clone(),
            text: text.to_string(),
        });
    }

    fn send_mail(&self, subject: &str, recipient: &str, body: &str) {
        let _ = self.tx.send(JournalEntry::Mail {
            unit: self.unit.clone(),
            subject: subject.to_string(),
            recipient: recipient.to_string(),
            body: body.to_string(),
        });
    }
}
