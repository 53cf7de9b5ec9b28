// Document ID Generator - Snowflake-like IDs that sort by creation time
// 64-bit ID format: [sign:1][timestamp:41][node_id:10][sequence:12]
// Timestamps count milliseconds since ID_EPOCH_MILLIS, so IDs stay positive until 2093

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub const MAX_NODE_ID: u16 = 1024;
/// 2024-01-01T00:00:00Z
pub const ID_EPOCH_MILLIS: u64 = 1_704_067_200_000;
const TIMESTAMP_MASK: u64 = 0x1FF_FFFF_FFFF;
const MAX_SEQUENCE: u64 = 4096;

#[derive(Debug, Default)]
struct GeneratorState {
    last_timestamp: u64,
    sequence: u64,
}

/// Allows 1024 writer nodes and 4096 IDs per millisecond per node
#[derive(Debug)]
pub struct DocumentIdGenerator {
    node_id: u16,
    state: Mutex<GeneratorState>,
}

impl DocumentIdGenerator {
    /// Node ids outside the 10-bit range wrap into it.
    pub fn new(node_id: u16) -> Self {
        Self {
            node_id: node_id % MAX_NODE_ID,
            state: Mutex::new(GeneratorState::default()),
        }
    }

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| (d.as_millis() as u64).saturating_sub(ID_EPOCH_MILLIS))
            .unwrap_or_default()
    }

    /// Strictly increasing for a single generator.
    pub fn next_id(&self) -> i64 {
        loop {
            let now = Self::now_millis();
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            if now > state.last_timestamp {
                state.last_timestamp = now;
                state.sequence = 1;
                return self.compose(now, 0);
            }

            // Same millisecond, or the clock went backwards: keep issuing from the last one
            if state.sequence < MAX_SEQUENCE {
                let seq = state.sequence;
                state.sequence += 1;
                return self.compose(state.last_timestamp, seq);
            }

            // Sequence exhausted for this millisecond
            drop(state);
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    fn compose(&self, timestamp: u64, sequence: u64) -> i64 {
        (((timestamp & TIMESTAMP_MASK) << 22)
            | ((self.node_id as u64) << 12)
            | (sequence & 0xFFF)) as i64
    }

    pub fn extract_node_id(id: i64) -> u16 {
        ((id as u64) >> 12 & 0x3FF) as u16
    }

    /// Unix milliseconds at which the id was issued.
    pub fn extract_timestamp(id: i64) -> u64 {
        ((id as u64) >> 22) + ID_EPOCH_MILLIS
    }

    pub fn extract_sequence(id: i64) -> u16 {
        ((id as u64) & 0xFFF) as u16
    }

    pub fn node_id(&self) -> u16 {
        self.node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_id_generation() {
        let generator = DocumentIdGenerator::new(123);

        let id1 = generator.next_id();
        let id2 = generator.next_id();
        let id3 = generator.next_id();

        assert!(id1 < id2 && id2 < id3);
        assert_eq!(DocumentIdGenerator::extract_node_id(id1), 123);
        assert_eq!(DocumentIdGenerator::extract_node_id(id3), 123);
        assert!(id1 > 0);
    }

    #[test]
    fn test_timestamp_is_unix_millis() {
        let generator = DocumentIdGenerator::new(3);
        let before = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64;
        let id = generator.next_id();
        let after = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64;

        let issued = DocumentIdGenerator::extract_timestamp(id);
        assert!(issued >= before && issued <= after, "{} not in {}..={}", issued, before, after);
    }

    #[test]
    fn test_ids_stay_positive_for_decades() {
        let generator = DocumentIdGenerator::new(MAX_NODE_ID - 1);
        // 2060-01-01T00:00:00Z
        let unix_2060: u64 = 2_840_140_800_000;
        let id = generator.compose(unix_2060 - ID_EPOCH_MILLIS, 4095);

        assert!(id > 0);
        assert_eq!(DocumentIdGenerator::extract_timestamp(id), unix_2060);
        assert_eq!(DocumentIdGenerator::extract_node_id(id), MAX_NODE_ID - 1);
        assert_eq!(DocumentIdGenerator::extract_sequence(id), 4095);
    }

    #[test]
    fn test_node_wraps_into_range() {
        let generator = DocumentIdGenerator::new(1024 + 5);
        assert_eq!(generator.node_id(), 5);
        let id = generator.next_id();
        assert_eq!(DocumentIdGenerator::extract_node_id(id), 5);
    }

    #[test]
    fn test_unique_across_threads() {
        let generator = Arc::new(DocumentIdGenerator::new(1));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = generator.clone();
                std::thread::spawn(move || {
                    (0..2000).map(|_| generator.next_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 8000);
    }
}
