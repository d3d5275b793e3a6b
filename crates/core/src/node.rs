use tracing::{debug, info};

use crate::cluster::{external_hostnames, internal_hostnames};
use crate::error::MolsimError;
use crate::instance::InstanceRecord;
use crate::{ClusterImages, Connection, Connector};

/// A discovered cluster member with an open control connection.
pub struct Node {
    pub index: usize,
    pub external_name: String,
    pub internal_name: String,
    pub internal_ip: String,
    pub internal_name_short: String,
    pub alias: String,
    pub connection: Box<dyn Connection>,
}

impl Node {
    pub fn is_master(&self) -> bool {
        self.index == 0
    }

    pub fn close(&mut self) -> Result<(), MolsimError> {
        self.connection.close()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("index", &self.index)
            .field("alias", &self.alias)
            .field("external_name", &self.external_name)
            .field("internal_name", &self.internal_name)
            .field("internal_ip", &self.internal_ip)
            .finish()
    }
}

/// `master` for the first node, `node001`, `node002`, ... for the rest.
pub fn node_alias(index: usize) -> String {
    if index == 0 {
        "master".to_string()
    } else {
        format!("node{:03}", index)
    }
}

/// Hostname up to the first `.`.
pub fn short_name(hostname: &str) -> &str {
    hostname.split('.').next().unwrap_or(hostname)
}

fn resolve_internal_ip(connection: &dyn Connection, internal_name: &str) -> Result<String, MolsimError> {
    let output = connection.execute(&format!("getent hosts {}", internal_name))?;
    output
        .iter()
        .find_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .ok_or_else(|| {
            MolsimError::remote(
                connection.host(),
                format!("could not resolve {}", internal_name),
            )
        })
}

/// Build the node registry from one describe-instances response.
pub fn get_nodes(
    records: &[InstanceRecord],
    images: &ClusterImages,
    connector: &dyn Connector,
) -> Result<Vec<Node>, MolsimError> {
    let internal = internal_hostnames(records, images).unwrap_or_default();
    let external = external_hostnames(records, images).unwrap_or_default();
    register_nodes(internal, external, connector)
}

/// Pair internal and external hostnames into nodes.
///
/// A length mismatch truncates to the shorter list. One connection per node
/// is opened sequentially, and each node's internal IP is resolved over it.
pub fn register_nodes(
    internal: Vec<String>,
    external: Vec<String>,
    connector: &dyn Connector,
) -> Result<Vec<Node>, MolsimError> {
    let mut nodes = Vec::with_capacity(internal.len().min(external.len()));
    for (index, (internal_name, external_name)) in internal.into_iter().zip(external).enumerate() {
        info!(host = %external_name, "opening control connection");
        let connection = connector.connect(&external_name)?;
        let internal_ip = resolve_internal_ip(connection.as_ref(), &internal_name)?;
        debug!(host = %external_name, ip = %internal_ip, "resolved internal address");

        nodes.push(Node {
            index,
            internal_name_short: short_name(&internal_name).to_string(),
            alias: node_alias(index),
            external_name,
            internal_name,
            internal_ip,
            connection,
        });
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::tests::{images, instance};
    use crate::instance::InstanceState;
    use std::sync::{Arc, Mutex};

    struct FakeConnection {
        host: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Connection for FakeConnection {
        fn host(&self) -> &str {
            &self.host
        }

        fn execute(&self, command: &str) -> Result<Vec<String>, MolsimError> {
            self.log.lock().unwrap().push(format!("{}: {}", self.host, command));
            let name = command.trim_start_matches("getent hosts ");
            let id = short_name(name).trim_start_matches("i-");
            Ok(vec![format!("10.0.0.{}       {}", id, name)])
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Connector for FakeConnector {
        fn connect(&self, host: &str) -> Result<Box<dyn Connection>, MolsimError> {
            self.log.lock().unwrap().push(format!("connect {}", host));
            Ok(Box::new(FakeConnection {
                host: host.to_string(),
                log: self.log.clone(),
            }))
        }
    }

    struct SilentConnector;

    impl Connector for SilentConnector {
        fn connect(&self, host: &str) -> Result<Box<dyn Connection>, MolsimError> {
            struct Silent(String);
            impl Connection for Silent {
                fn host(&self) -> &str {
                    &self.0
                }
                fn execute(&self, _command: &str) -> Result<Vec<String>, MolsimError> {
                    Ok(vec![])
                }
            }
            Ok(Box::new(Silent(host.to_string())))
        }
    }

    #[test]
    fn aliases_are_master_then_zero_padded() {
        assert_eq!(node_alias(0), "master");
        assert_eq!(node_alias(1), "node001");
        assert_eq!(node_alias(42), "node042");
        assert_eq!(node_alias(1234), "node1234");
    }

    #[test]
    fn short_name_truncates_at_first_dot() {
        assert_eq!(short_name("ip-10-0-0-1.ec2.internal"), "ip-10-0-0-1");
        assert_eq!(short_name("plainhost"), "plainhost");
    }

    #[test]
    fn registry_has_one_node_per_running_instance() {
        let records = vec![
            instance("i-1", "ami-master", InstanceState::Running),
            instance("i-2", "ami-node", InstanceState::Running),
            instance("i-3", "ami-node", InstanceState::Pending),
            instance("i-4", "ami-node", InstanceState::Running),
        ];
        let connector = FakeConnector::default();
        let nodes = get_nodes(&records, &images(), &connector).unwrap();

        assert_eq!(nodes.len(), 3);
        let aliases: Vec<&str> = nodes.iter().map(|n| n.alias.as_str()).collect();
        assert_eq!(aliases, vec!["master", "node001", "node002"]);
        assert!(nodes[0].is_master());
        assert_eq!(nodes[1].index, 1);
        assert_eq!(nodes[1].internal_ip, "10.0.0.2");
        assert_eq!(nodes[2].internal_name_short, "i-4");
        assert_eq!(nodes[2].external_name, "i-4.compute-1.amazonaws.com");

        let log = connector.log.lock().unwrap();
        assert_eq!(log[0], "connect i-1.compute-1.amazonaws.com");
        assert_eq!(
            log[1],
            "i-1.compute-1.amazonaws.com: getent hosts i-1.ec2.internal"
        );
        assert_eq!(log.len(), 6);
    }

    #[test]
    fn mismatched_hostname_lists_truncate_to_shorter() {
        let internal = vec!["i-1.ec2.internal".to_string(), "i-2.ec2.internal".to_string()];
        let external = vec![
            "a.example.com".to_string(),
            "b.example.com".to_string(),
            "c.example.com".to_string(),
        ];
        let nodes = register_nodes(internal, external, &FakeConnector::default()).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].external_name, "b.example.com");
        assert_eq!(nodes[1].alias, "node001");
    }

    #[test]
    fn registry_is_empty_for_empty_response() {
        let nodes = get_nodes(&[], &images(), &FakeConnector::default()).unwrap();
        assert!(nodes.is_empty());
    }

    #[test]
    fn unresolvable_internal_name_is_a_remote_error() {
        let records = vec![instance("i-1", "ami-node", InstanceState::Running)];
        let err = get_nodes(&records, &images(), &SilentConnector).unwrap_err();
        assert!(matches!(err, MolsimError::Remote { .. }));
    }
}
