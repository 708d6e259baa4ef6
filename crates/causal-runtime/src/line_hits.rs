//! Per-line experiment diagnostics, dumped at shutdown

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use causal_core::SpinLock;

/// One selected line and how often it was experimented on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineHitSummary {
    pub class: String,
    pub line: i32,
    pub hits: u64,
    /// Sampled offsets that led to this line being picked
    pub offsets: Vec<i32>,
}

impl fmt::Display for LineHitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} hits: {} offsets: {:?}", self.class, self.line, self.hits, self.offsets)
    }
}

#[derive(Default)]
struct Entry {
    hits: u64,
    offsets: BTreeSet<i32>,
}

#[derive(Default)]
pub struct LineHits {
    entries: SpinLock<BTreeMap<(String, i32), Entry>>,
}

impl LineHits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hit(&self, class: &str, line: i32, offset: i32) {
        let mut entries = self.entries.lock();
        let entry = entries.entry((class.to_string(), line)).or_default();
        entry.hits += 1;
        entry.offsets.insert(offset);
    }

    /// Every line, most experimented-on first.
    pub fn dump(&self) -> Vec<LineHitSummary> {
        let entries = self.entries.lock();
        let mut out: Vec<LineHitSummary> = entries
            .iter()
            .map(|((class, line), e)| LineHitSummary {
                class: class.clone(),
                line: *line,
                hits: e.hits,
                offsets: e.offsets.iter().copied().collect(),
            })
            .collect();
        out.sort_by(|a, b| b.hits.cmp(&a.hits));
        out
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
