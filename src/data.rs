use crate::types::{NodeId, Record};
use std::collections::BTreeSet;

/// Readings a head holds until its next forwarding tick.
///
/// Arrival order is preserved; a record already held (same round, source and
/// sequence number) is not buffered twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationBuffer {
    records: Vec<Record>,
    keys: BTreeSet<(u64, NodeId, u32)>,
}

impl AggregationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one record; returns false for a duplicate.
    pub fn push(&mut self, record: Record) -> bool {
        if !self.keys.insert(record.key()) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Concatenates a downstream aggregate.
    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            self.push(record);
        }
    }

    /// Empties the buffer, returning its records in arrival order.
    pub fn take(&mut self) -> Vec<Record> {
        self.keys.clear();
        std::mem::take(&mut self.records)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Textual aggregate, one `Source {src}: seq {seq}: {payload}` line per record.
pub fn render(records: &[Record]) -> String {
    records
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: NodeId, seq: u32) -> Record {
        Record {
            round: 0,
            source,
            seq,
            payload: format!("reading-{source}-{seq}"),
        }
    }

    #[test]
    fn test_push_dedupes_and_keeps_order() {
        let mut buffer = AggregationBuffer::new();
        assert!(buffer.push(record(3, 0)));
        assert!(buffer.push(record(1, 0)));
        assert!(!buffer.push(record(3, 0)));
        let sources: Vec<_> = buffer.records().iter().map(|r| r.source).collect();
        assert_eq!(sources, vec![3, 1]);
    }

    #[test]
    fn test_take_clears() {
        let mut buffer = AggregationBuffer::new();
        buffer.extend(vec![record(1, 0), record(1, 1)]);
        let taken = buffer.take();
        assert_eq!(taken.len(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.push(record(1, 0)));
    }

    #[test]
    fn test_render_lines() {
        let text = render(&[record(1, 0), record(2, 1)]);
        assert_eq!(
            text,
            "Source 1: seq 0: reading-1-0\nSource 2: seq 1: reading-2-1"
        );
    }
}
