use std::collections::HashSet;

use metrics::counter;
use tracing::info;

use sniper_domain::model::PendingTxRecord;

/// Transaction IDs already acted upon in the current session. Membership is a
/// set; the listing keeps first-seen order so status output stays stable.
#[derive(Debug, Default, Clone)]
pub struct SeenTransactions {
    ids: HashSet<String>,
    order: Vec<String>,
}

impl SeenTransactions {
    /// Returns the IDs among `records` that were sent by `target` and were not
    /// seen before, marking them seen in the same step. Callers hold the
    /// session lock so check-and-mark is atomic.
    pub fn claim_new(&mut self, target: &str, records: &[PendingTxRecord]) -> Vec<String> {
        let mut fresh = Vec::new();
        for tx_id in matching_tx_ids(target, records) {
            if self.ids.insert(tx_id.clone()) {
                self.order.push(tx_id.clone());
                counter!("sniper_detections_total").increment(1);
                info!(%tx_id, sender = target, "target transaction detected");
                fresh.push(tx_id);
            }
        }
        fresh
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.ids.contains(tx_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}

/// IDs of the records sent by `target`, each reported once even when several
/// endpoints returned the same transaction. Records without an ID or a sender are
/// skipped.
pub fn matching_tx_ids(target: &str, records: &[PendingTxRecord]) -> Vec<String> {
    let mut reported: HashSet<&str> = HashSet::new();
    let mut ids = Vec::new();
    for record in records {
        let identified = !record.tx_id.is_empty() && !record.sender_address.is_empty();
        if identified && record.sender_address == target && reported.insert(&record.tx_id) {
            ids.push(record.tx_id.clone());
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    #[test]
    fn claims_only_target_transactions() {
        let mut seen = SeenTransactions::default();
        let records = vec![record("TX1", "ADDR1"), record("TX2", "OTHER")];

        assert_eq!(seen.claim_new("ADDR1", &records), vec!["TX1"]);
        assert!(seen.contains("TX1"));
        assert!(!seen.contains("TX2"));
    }

    #[test]
    fn repeated_observation_is_idempotent() {
        let mut seen = SeenTransactions::default();
        let records = vec![record("TX1", "ADDR1")];

        assert_eq!(seen.claim_new("ADDR1", &records).len(), 1);
        assert!(seen.claim_new("ADDR1", &records).is_empty());
        assert!(seen.claim_new("ADDR1", &records).is_empty());
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn duplicate_ids_in_one_batch_count_once() {
        let mut seen = SeenTransactions::default();
        let records = vec![record("TX1", "ADDR1"), record("TX1", "ADDR1")];

        assert_eq!(seen.claim_new("ADDR1", &records), vec!["TX1"]);
        assert_eq!(seen.ids(), ["TX1".to_string()]);
    }

    #[test]
    fn distinct_ids_in_one_batch_are_independent_detections() {
        let mut seen = SeenTransactions::default();
        let records = vec![
            record("TX1", "ADDR1"),
            record("TX2", "ADDR1"),
            record("TX3", "ADDR1"),
        ];

        assert_eq!(seen.claim_new("ADDR1", &records), vec!["TX1", "TX2", "TX3"]);
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut seen = SeenTransactions::default();
        seen.claim_new("ADDR1", &[record("TX1", "ADDR1")]);
        seen.clear();

        assert!(seen.is_empty());
        assert_eq!(seen.claim_new("ADDR1", &[record("TX1", "ADDR1")]), vec!["TX1"]);
    }

    #[test]
    fn matching_reports_each_id_once() {
        let records = vec![
            record("TX1", "ADDR1"),
            record("TX1", "ADDR1"),
            record("TX2", "ADDR2"),
        ];
        assert_eq!(matching_tx_ids("ADDR1", &records), vec!["TX1"]);
        assert!(matching_tx_ids("NOBODY", &records).is_empty());
    }

    #[test]
    fn records_without_id_or_sender_never_match() {
        let mut seen = SeenTransactions::default();
        let records = vec![record("", "ADDR1"), record("TX1", ""), record("TX2", "ADDR1")];

        assert_eq!(seen.claim_new("ADDR1", &records), vec!["TX2"]);
        assert!(seen.claim_new("", &records).is_empty());
        assert_eq!(seen.len(), 1);
    }
}
