use chrono::{DateTime, Utc};
use comfy_table::{Cell, Table};
use molsim_core::instance::{InstanceRecord, instance_rows};
use molsim_core::node::Node;

pub fn instance_table(records: &[InstanceRecord], now: DateTime<Utc>) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Image", "External Hostname", "Internal Hostname", "State", "Role", "Up For"]);

    for row in instance_rows(records) {
        table.add_row(vec![
            Cell::new(&row.instance_id),
            Cell::new(&row.image_id),
            Cell::new(&row.external_hostname),
            Cell::new(&row.internal_hostname),
            Cell::new(row.state.as_str()),
            Cell::new(row.role.map(|r| r.as_str()).unwrap_or("-")),
            Cell::new(format_uptime(row.launch_time, now)),
        ]);
    }
    table
}

pub fn node_table(nodes: &[Node]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["#", "Alias", "Short Name", "Internal IP", "Internal Hostname", "External Hostname"]);

    for node in nodes {
        table.add_row(vec![
            Cell::new(node.index),
            Cell::new(&node.alias),
            Cell::new(&node.internal_name_short),
            Cell::new(&node.internal_ip),
            Cell::new(&node.internal_name),
            Cell::new(&node.external_name),
        ]);
    }
    table
}

/// Time since launch, formatted like "2h 30m".
fn format_uptime(launch_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match launch_time {
        Some(launched) if launched <= now => {
            let total_seconds = (now - launched).num_seconds();
            let hours = total_seconds / 3600;
            let minutes = (total_seconds % 3600) / 60;
            format!("{}h {}m", hours, minutes)
        }
        Some(_) => "0h 0m".to_string(),
        None => "-".to_string(),
    }
}
