use parking_lot::Mutex;
use serde::Serialize;

/// Accumulated token counts for one `(model, processor)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub candidates_tokens: u64,
    pub total_tokens: u64,
    pub call_count: u64,
}

/// One keyed entry in the usage summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    pub model: String,
    pub processor: String,
    #[serde(flatten)]
    pub usage: TokenUsage,
}

/// Ordered snapshot plus running totals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub entries: Vec<UsageEntry>,
    pub totals: TokenUsage,
}

/// Per-job token accounting, shared by reference with processors.
///
/// Increments are serialised behind a mutex; construction is cheap and
/// one tracker exists per job.
#[derive(Default)]
pub struct TokenUsageTracker {
    entries: Mutex<Vec<UsageEntry>>,
}

impl TokenUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one model call attributed to a processor.
    pub fn record(&self, model: &str, processor: &str, prompt_tokens: u64, candidates_tokens: u64) {
        let mut entries = self.entries.lock();
        let entry = match entries
            .iter_mut()
            .find(|e| e.model == model && e.processor == processor)
        {
            Some(entry) => entry,
            None => {
                entries.push(UsageEntry {
                    model: model.to_string(),
                    processor: processor.to_string(),
                    usage: TokenUsage::default(),
                });
                entries.last_mut().expect("just pushed")
            }
        };
        entry.usage.prompt_tokens += prompt_tokens;
        entry.usage.candidates_tokens += candidates_tokens;
        entry.usage.total_tokens += prompt_tokens + candidates_tokens;
        entry.usage.call_count += 1;
    }

    pub fn reset(&self) {
        self.entries.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot in first-recorded order, with totals across all entries.
    pub fn summary(&self) -> UsageSummary {
        let entries = self.entries.lock().clone();
        let mut totals = TokenUsage::default();
        for entry in &entries {
            totals.prompt_tokens += entry.usage.prompt_tokens;
            totals.candidates_tokens += entry.usage.candidates_tokens;
            totals.total_tokens += entry.usage.total_tokens;
            totals.call_count += entry.usage.call_count;
        }
        UsageSummary { entries, totals }
    }
}
