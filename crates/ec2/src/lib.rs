pub mod response;
pub mod sigv4;

use molsim_core::error::MolsimError;
use molsim_core::instance::InstanceRecord;
use molsim_core::{InstanceProvider, LaunchRequest};
use reqwest::Url;
use tracing::{debug, info};

use response::{CLUSTER_TAG, ROLE_TAG};
pub use sigv4::Credentials;

const API_VERSION: &str = "2016-11-15";
const SERVICE: &str = "ec2";

/// EC2 Query API client.
pub struct Ec2 {
    credentials: Credentials,
    region: String,
    endpoint: Url,
    client: reqwest::blocking::Client,
}

impl Ec2 {
    pub fn new(credentials: Credentials, region: String, endpoint: Option<String>) -> Result<Ec2, MolsimError> {
        let endpoint = endpoint.unwrap_or_else(|| format!("https://ec2.{}.amazonaws.com/", region));
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| MolsimError::Config(format!("invalid ec2 endpoint '{}': {}", endpoint, e)))?;
        Ok(Ec2 {
            credentials,
            region,
            endpoint,
            client: reqwest::blocking::Client::new(),
        })
    }

    fn host(&self) -> Result<String, MolsimError> {
        let host = self
            .endpoint
            .host_str()
            .ok_or_else(|| MolsimError::Config(format!("ec2 endpoint '{}' has no host", self.endpoint)))?;
        Ok(match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    /// Send one signed Query API action and return the response body.
    fn call(&self, action: &str, params: &[(String, String)]) -> Result<String, MolsimError> {
        let body = form_body(action, params);
        let host = self.host()?;
        let headers = sigv4::sign_post(
            &self.credentials,
            &self.region,
            SERVICE,
            &host,
            &body,
            chrono::Utc::now(),
        )?;

        debug!(action, endpoint = %self.endpoint, "sending ec2 request");
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", sigv4::CONTENT_TYPE)
            .body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .map_err(|e| MolsimError::provider(format!("Request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| MolsimError::provider(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(response::api_error(status.as_u16(), &text));
        }
        Ok(text)
    }
}

fn form_body(action: &str, params: &[(String, String)]) -> String {
    let mut pairs = vec![
        ("Action".to_string(), action.to_string()),
        ("Version".to_string(), API_VERSION.to_string()),
    ];
    pairs.extend(params.iter().cloned());
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn run_params(request: &LaunchRequest, client_token: &str) -> Vec<(String, String)> {
    let p = |k: &str, v: &str| (k.to_string(), v.to_string());
    vec![
        p("ImageId", &request.image_id),
        p("InstanceType", &request.instance_type),
        p("MinCount", &request.min_count.to_string()),
        p("MaxCount", &request.max_count.to_string()),
        p("KeyName", &request.key_name),
        p("ClientToken", client_token),
        p("TagSpecification.1.ResourceType", "instance"),
        p("TagSpecification.1.Tag.1.Key", ROLE_TAG),
        p("TagSpecification.1.Tag.1.Value", request.role.as_str()),
        p("TagSpecification.1.Tag.2.Key", CLUSTER_TAG),
        p("TagSpecification.1.Tag.2.Value", &request.cluster_name),
    ]
}

fn terminate_params(instance_ids: &[String]) -> Vec<(String, String)> {
    instance_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (format!("InstanceId.{}", i + 1), id.clone()))
        .collect()
}

impl InstanceProvider for Ec2 {
    fn describe_instances(&self) -> Result<Vec<InstanceRecord>, MolsimError> {
        let body = self.call("DescribeInstances", &[])?;
        response::parse_describe_instances(&body)
    }

    fn run_instances(&self, request: &LaunchRequest) -> Result<Vec<InstanceRecord>, MolsimError> {
        let client_token = uuid::Uuid::new_v4().to_string();
        info!(
            image = %request.image_id,
            role = %request.role,
            min = request.min_count,
            max = request.max_count,
            "launching instances"
        );
        let body = self.call("RunInstances", &run_params(request, &client_token))?;
        response::parse_run_instances(&body)
    }

    fn terminate_instances(&self, instance_ids: &[String]) -> Result<(), MolsimError> {
        if instance_ids.is_empty() {
            return Ok(());
        }
        info!(count = instance_ids.len(), "terminating instances");
        self.call("TerminateInstances", &terminate_params(instance_ids))?;
        Ok(())
    }
}
