use humantime::parse_duration;
use molsim_core::ClusterImages;
use molsim_core::error::MolsimError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::spinner::SpinnerStyle;

const CONFIG_PATH: &str = "~/.molsim/config.toml";

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    ec2: Ec2Section,
    #[serde(default)]
    cluster: ClusterSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Ec2Section {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterSection {
    image_id: Option<String>,
    master_image_id: Option<String>,
    instance_type: Option<String>,
    size: Option<usize>,
    key_name: Option<String>,
    key_location: Option<String>,
    ssh_user: Option<String>,
    cluster_user: Option<String>,
    name: Option<String>,
    spinner: Option<u8>,
    poll_interval: Option<String>,
    startup_timeout: Option<String>,
    settle_delay: Option<String>,
    spinner_interval: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Ec2Config {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: String,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub images: ClusterImages,
    pub instance_type: String,
    pub size: usize,
    pub key_name: String,
    pub key_location: PathBuf,
    pub ssh_user: String,
    pub cluster_user: String,
    pub name: String,
    pub spinner: SpinnerStyle,
    pub poll_interval: Duration,
    pub startup_timeout: Duration,
    pub settle_delay: Duration,
    pub spinner_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ec2: Ec2Config,
    pub cluster: ClusterConfig,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn required(value: Option<String>, key: &str, section: &str) -> Result<String, MolsimError> {
    value.ok_or_else(|| {
        MolsimError::Config(format!("{} is required, set it in the [{}] section of your molsim config", key, section))
    })
}

fn duration(value: Option<String>, key: &str, default: Duration) -> Result<Duration, MolsimError> {
    match value {
        None => Ok(default),
        Some(s) => parse_duration(&s).map_err(|e| {
            MolsimError::Config(format!(
                "invalid duration for {}: '{}' ({}). Use formats like '15s', '1m30s', '30m'",
                key, s, e
            ))
        }),
    }
}

/// Build a config from TOML text, consulting `env` for credentials and region
/// the file leaves out.
pub fn parse_config_str(
    contents: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, MolsimError> {
    let file: ConfigFile =
        toml::from_str(contents).map_err(|e| MolsimError::Config(format!("failed to parse config: {}", e)))?;
    let ConfigFile { ec2, cluster } = file;

    let ec2 = Ec2Config {
        access_key_id: required(ec2.access_key_id.or_else(|| env("AWS_ACCESS_KEY_ID")), "access-key-id", "ec2")?,
        secret_access_key: required(
            ec2.secret_access_key.or_else(|| env("AWS_SECRET_ACCESS_KEY")),
            "secret-access-key",
            "ec2",
        )?,
        session_token: ec2.session_token.or_else(|| env("AWS_SESSION_TOKEN")),
        region: ec2
            .region
            .or_else(|| env("AWS_REGION"))
            .or_else(|| env("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| "us-east-1".to_string()),
        endpoint: ec2.endpoint,
    };

    let spinner = match cluster.spinner {
        None => SpinnerStyle::default(),
        Some(index) => SpinnerStyle::from_index(index)
            .ok_or_else(|| MolsimError::Config(format!("spinner must be 0-3, got {}", index)))?,
    };

    let cluster = ClusterConfig {
        images: ClusterImages {
            worker: required(cluster.image_id, "image-id", "cluster")?,
            master: cluster.master_image_id,
        },
        instance_type: cluster.instance_type.unwrap_or_else(|| "m1.small".to_string()),
        size: cluster.size.unwrap_or(2),
        key_name: required(cluster.key_name, "key-name", "cluster")?,
        key_location: expand_tilde(&required(cluster.key_location, "key-location", "cluster")?),
        ssh_user: cluster.ssh_user.unwrap_or_else(|| "root".to_string()),
        cluster_user: cluster.cluster_user.unwrap_or_else(|| "sgeadmin".to_string()),
        name: cluster.name.unwrap_or_else(|| "molsim".to_string()),
        spinner,
        poll_interval: duration(cluster.poll_interval, "poll-interval", Duration::from_secs(15))?,
        startup_timeout: duration(cluster.startup_timeout, "startup-timeout", Duration::from_secs(30 * 60))?,
        settle_delay: duration(cluster.settle_delay, "settle-delay", Duration::from_secs(5))?,
        spinner_interval: duration(cluster.spinner_interval, "spinner-interval", Duration::from_secs(1))?,
    };

    Ok(Config { ec2, cluster })
}

/// Load the config from `path`, or from ~/.molsim/config.toml.
pub fn parse_config(path: Option<&Path>) -> Result<Config, MolsimError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => expand_tilde(CONFIG_PATH),
    };
    let contents = fs::read_to_string(&config_path).map_err(|e| {
        MolsimError::Config(format!("failed to read {}: {}", config_path.display(), e))
    })?;
    parse_config_str(&contents, |key| std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[ec2]
access-key-id = "AKID"
secret-access-key = "secret"

[cluster]
image-id = "ami-node"
key-name = "molsim"
key-location = "/keys/molsim.pem"
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let config = parse_config_str(MINIMAL, no_env).unwrap();
        assert_eq!(config.ec2.region, "us-east-1");
        assert!(config.ec2.session_token.is_none());
        assert_eq!(config.cluster.images.worker, "ami-node");
        assert!(config.cluster.images.master.is_none());
        assert_eq!(config.cluster.instance_type, "m1.small");
        assert_eq!(config.cluster.size, 2);
        assert_eq!(config.cluster.ssh_user, "root");
        assert_eq!(config.cluster.key_location, PathBuf::from("/keys/molsim.pem"));
        assert_eq!(config.cluster.poll_interval, Duration::from_secs(15));
        assert_eq!(config.cluster.startup_timeout, Duration::from_secs(1800));
        assert_eq!(config.cluster.settle_delay, Duration::from_secs(5));
        assert_eq!(config.cluster.spinner, SpinnerStyle::Bars);
    }

    #[test]
    fn full_config_overrides_defaults() {
        let contents = r#"
[ec2]
access-key-id = "AKID"
secret-access-key = "secret"
region = "eu-west-1"
endpoint = "http://localhost:4566/"

[cluster]
image-id = "ami-node"
master-image-id = "ami-master"
instance-type = "c5.xlarge"
size = 8
key-name = "molsim"
key-location = "/keys/molsim.pem"
cluster-user = "sim"
spinner = 0
poll-interval = "2s"
startup-timeout = "1h 30m"
"#;
        let config = parse_config_str(contents, no_env).unwrap();
        assert_eq!(config.ec2.region, "eu-west-1");
        assert_eq!(config.ec2.endpoint.as_deref(), Some("http://localhost:4566/"));
        assert_eq!(config.cluster.images.master.as_deref(), Some("ami-master"));
        assert_eq!(config.cluster.size, 8);
        assert_eq!(config.cluster.cluster_user, "sim");
        assert_eq!(config.cluster.spinner, SpinnerStyle::Circles);
        assert_eq!(config.cluster.poll_interval, Duration::from_secs(2));
        assert_eq!(config.cluster.startup_timeout, Duration::from_secs(5400));
    }

    #[test]
    fn credentials_fall_back_to_environment() {
        let contents = r#"
[cluster]
image-id = "ami-node"
key-name = "molsim"
key-location = "/keys/molsim.pem"
"#;
        let env = |key: &str| match key {
            "AWS_ACCESS_KEY_ID" => Some("ENVKEY".to_string()),
            "AWS_SECRET_ACCESS_KEY" => Some("ENVSECRET".to_string()),
            "AWS_DEFAULT_REGION" => Some("ap-southeast-2".to_string()),
            _ => None,
        };
        let config = parse_config_str(contents, env).unwrap();
        assert_eq!(config.ec2.access_key_id, "ENVKEY");
        assert_eq!(config.ec2.secret_access_key, "ENVSECRET");
        assert_eq!(config.ec2.region, "ap-southeast-2");
    }

    #[test]
    fn missing_image_is_reported() {
        let contents = r#"
[ec2]
access-key-id = "AKID"
secret-access-key = "secret"
"#;
        let err = parse_config_str(contents, no_env).unwrap_err();
        assert!(err.to_string().contains("image-id is required"));
    }

    #[test]
    fn bad_duration_and_spinner_are_rejected() {
        let bad_duration = format!("{}poll-interval = \"soon\"\n", MINIMAL);
        let err = parse_config_str(&bad_duration, no_env).unwrap_err();
        assert!(err.to_string().contains("poll-interval"));

        let bad_spinner = format!("{}spinner = 7\n", MINIMAL);
        let err = parse_config_str(&bad_spinner, no_env).unwrap_err();
        assert!(err.to_string().contains("spinner must be 0-3"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let expanded = expand_tilde("~/.ssh/id_rsa");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".ssh/id_rsa"));
        }
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn loads_config_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = parse_config(Some(file.path())).unwrap();
        assert_eq!(config.cluster.key_name, "molsim");
    }

    #[test]
    fn unreadable_path_is_a_config_error() {
        let err = parse_config(Some(Path::new("/nonexistent/molsim.toml"))).unwrap_err();
        assert!(matches!(err, MolsimError::Config(_)));
    }
}
