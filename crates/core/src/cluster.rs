//! Cluster state derived from a single describe-instances response.
//!
//! Instances tagged with the master role sort ahead of the rest (stable), so
//! "first row is the master" holds whenever the cluster was launched with
//! role tags and falls back to provider order otherwise.

use crate::ClusterImages;
use crate::instance::{InstanceRecord, InstanceRow, InstanceState, NodeRole, instance_rows};

fn master_first<'a>(rows: impl Iterator<Item = &'a InstanceRow>) -> Vec<&'a InstanceRow> {
    let mut rows: Vec<&InstanceRow> = rows.collect();
    rows.sort_by_key(|row| row.role != Some(NodeRole::Master));
    rows
}

/// Running instances launched from one of the cluster images.
fn cluster_rows<'a>(records: &'a [InstanceRecord], images: &ClusterImages) -> Vec<&'a InstanceRow> {
    master_first(
        instance_rows(records)
            .filter(|row| row.state == InstanceState::Running && images.contains(&row.image_id)),
    )
}

/// Identifiers of the running cluster instances.
pub fn running_instances(records: &[InstanceRecord], images: &ClusterImages) -> Vec<String> {
    cluster_rows(records, images)
        .into_iter()
        .map(|row| row.instance_id.clone())
        .collect()
}

/// True when exactly `size` cluster instances are running.
pub fn is_cluster_up(records: &[InstanceRecord], images: &ClusterImages, size: usize) -> bool {
    cluster_rows(records, images).len() == size
}

/// `None` when the provider returned no rows at all.
pub fn external_hostnames(records: &[InstanceRecord], images: &ClusterImages) -> Option<Vec<String>> {
    if records.is_empty() {
        return None;
    }
    Some(
        cluster_rows(records, images)
            .into_iter()
            .map(|row| row.external_hostname.clone())
            .collect(),
    )
}

/// `None` when the provider returned no rows at all.
pub fn internal_hostnames(records: &[InstanceRecord], images: &ClusterImages) -> Option<Vec<String>> {
    if records.is_empty() {
        return None;
    }
    Some(
        cluster_rows(records, images)
            .into_iter()
            .map(|row| row.internal_hostname.clone())
            .collect(),
    )
}

/// External hostname of the master: the first running or pending instance,
/// regardless of image.
pub fn master_node(records: &[InstanceRecord]) -> Option<String> {
    master_first(instance_rows(records).filter(|row| {
        matches!(row.state, InstanceState::Running | InstanceState::Pending)
    }))
    .first()
    .map(|row| row.external_hostname.clone())
}
