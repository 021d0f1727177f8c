mod lifecycle;

use super::test_helpers::*;
use crate::db::IdentifierFilter;
use crate::types::{BatchId, IdentifierStatus};

/// Statuses of a batch's identifiers, in creation order
async fn identifier_statuses(t: &TestHarvester, batch_id: BatchId) -> Vec<IdentifierStatus> {
    t.harvester
        .db
        .list_identifiers(&IdentifierFilter {
            batch_id: Some(batch_id),
            status: None,
        })
        .await
        .unwrap()
        .iter()
        .map(|row| row.status())
        .collect()
}
