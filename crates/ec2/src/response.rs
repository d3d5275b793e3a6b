use chrono::{DateTime, Utc};
use molsim_core::error::MolsimError;
use molsim_core::instance::{InstanceRecord, InstanceRow, NodeRole, ReservationRow};
use serde::Deserialize;

pub const ROLE_TAG: &str = "molsim:role";
pub const CLUSTER_TAG: &str = "molsim:cluster";

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ItemSet<T> {
    #[serde(rename = "item", default)]
    items: Vec<T>,
}

impl<T> Default for ItemSet<T> {
    fn default() -> Self {
        ItemSet { items: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeInstancesResponse {
    #[serde(default)]
    reservation_set: ItemSet<Reservation>,
}

/// Also the body of a RunInstances response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reservation {
    reservation_id: String,
    #[serde(default)]
    owner_id: String,
    #[serde(default)]
    group_set: ItemSet<Group>,
    #[serde(default)]
    instances_set: ItemSet<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Group {
    #[serde(default)]
    group_id: String,
    #[serde(default)]
    group_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instance {
    instance_id: String,
    #[serde(default)]
    image_id: String,
    instance_state: State,
    #[serde(default)]
    private_dns_name: String,
    #[serde(default)]
    dns_name: String,
    #[serde(default)]
    launch_time: Option<String>,
    #[serde(default)]
    tag_set: ItemSet<Tag>,
}

#[derive(Debug, Deserialize)]
struct State {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Tag {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Errors")]
    errors: Errors,
}

#[derive(Debug, Deserialize)]
struct Errors {
    #[serde(rename = "Error", default)]
    error: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

impl Reservation {
    fn into_records(self, records: &mut Vec<InstanceRecord>) {
        let groups = self
            .group_set
            .items
            .into_iter()
            .map(|g| if g.group_name.is_empty() { g.group_id } else { g.group_name })
            .collect();
        records.push(InstanceRecord::Reservation(ReservationRow {
            reservation_id: self.reservation_id,
            owner_id: self.owner_id,
            groups,
        }));
        records.extend(
            self.instances_set
                .items
                .into_iter()
                .map(|i| InstanceRecord::Instance(i.into_row())),
        );
    }
}

impl Instance {
    fn into_row(self) -> InstanceRow {
        let role = self
            .tag_set
            .items
            .iter()
            .find(|t| t.key == ROLE_TAG)
            .and_then(|t| NodeRole::parse(&t.value));
        let launch_time = self
            .launch_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t.trim()).ok())
            .map(|t| t.with_timezone(&Utc));

        InstanceRow {
            instance_id: self.instance_id,
            image_id: self.image_id,
            external_hostname: self.dns_name,
            internal_hostname: self.private_dns_name,
            state: self.instance_state.name.parse().unwrap_or_else(|e| match e {}),
            launch_time,
            role,
        }
    }
}

fn parse_failure(action: &str, e: quick_xml::de::DeError, body: &str) -> MolsimError {
    MolsimError::provider(format!(
        "failed to parse {} response: {} - Response body: {}",
        action, e, body
    ))
}

pub fn parse_describe_instances(body: &str) -> Result<Vec<InstanceRecord>, MolsimError> {
    let response: DescribeInstancesResponse =
        quick_xml::de::from_str(body).map_err(|e| parse_failure("DescribeInstances", e, body))?;

    let mut records = Vec::new();
    for reservation in response.reservation_set.items {
        reservation.into_records(&mut records);
    }
    Ok(records)
}

pub fn parse_run_instances(body: &str) -> Result<Vec<InstanceRecord>, MolsimError> {
    let reservation: Reservation =
        quick_xml::de::from_str(body).map_err(|e| parse_failure("RunInstances", e, body))?;

    let mut records = Vec::new();
    reservation.into_records(&mut records);
    Ok(records)
}

/// Provider error for a non-success HTTP response, using the EC2 error
/// document when the body carries one.
pub fn api_error(status: u16, body: &str) -> MolsimError {
    match quick_xml::de::from_str::<ErrorResponse>(body) {
        Ok(response) if !response.errors.error.is_empty() => {
            let first = &response.errors.error[0];
            MolsimError::Provider {
                code: Some(first.code.clone()),
                message: format!("API Error ({}): {}: {}", status, first.code, first.message),
            }
        }
        _ => MolsimError::provider(format!("API Error ({}): {}", status, body)),
    }
}
