//! One-shot advisories raised while a search runs.

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// What an advisory is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvisoryKind {
    /// The search is long enough to benefit from distributed execution.
    DistributedExecution,
    /// The sequential optimizer spends too long proposing points.
    SlowOptimizer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: AdvisoryKind,
    pub message: String,
}

impl Advisory {
    pub fn new(kind: AdvisoryKind, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            message,
        }
    }
}

/// Sink for advisories. Always logs; forwards to a channel when one is attached.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    advisory_tx: Option<Sender<Advisory>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sender(advisory_tx: Sender<Advisory>) -> Self {
        Self {
            advisory_tx: Some(advisory_tx),
        }
    }

    pub fn emit(&self, advisory: Advisory) {
        warn!(kind = ?advisory.kind, "{}", advisory.message);
        if let Some(tx) = &self.advisory_tx {
            // Nobody may be listening anymore.
            let _ = tx.try_send(advisory);
        }
    }
}
