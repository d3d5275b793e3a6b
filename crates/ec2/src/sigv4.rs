//! AWS Signature Version 4 for form-encoded POST requests.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use molsim_core::error::MolsimError;
use sha2::{Digest, Sha256};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, MolsimError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| MolsimError::provider(format!("invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>, MolsimError> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Headers to attach to a signed `POST /` request, in addition to
/// `content-type: CONTENT_TYPE` and the `host` header.
pub fn sign_post(
    credentials: &Credentials,
    region: &str,
    service: &str,
    host: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Vec<(&'static str, String)>, MolsimError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut canonical_headers = vec![
        ("content-type", CONTENT_TYPE.to_string()),
        ("host", host.to_string()),
        ("x-amz-date", amz_date.clone()),
    ];
    if let Some(token) = &credentials.session_token {
        canonical_headers.push(("x-amz-security-token", token.clone()));
    }

    let signed_headers = canonical_headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");
    let header_block: String = canonical_headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();

    let canonical_request = format!(
        "POST\n/\n\n{}\n{}\n{}",
        header_block,
        signed_headers,
        sha256_hex(body.as_bytes())
    );

    let scope = format!("{}/{}/{}/aws4_request", date, region, service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(&credentials.secret_access_key, &date, region, service)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    let mut headers = vec![
        ("x-amz-date", amz_date),
        (
            "authorization",
            format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
            ),
        ),
    ];
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token", token.clone()));
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credentials(token: Option<&str>) -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
            session_token: token.map(str::to_string),
        }
    }

    #[test]
    fn derives_published_signing_key() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn authorization_names_scope_and_signed_headers() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 8, 30, 0).unwrap();
        let headers = sign_post(
            &credentials(None),
            "us-east-1",
            "ec2",
            "ec2.us-east-1.amazonaws.com",
            "Action=DescribeInstances&Version=2016-11-15",
            now,
        )
        .unwrap();

        assert_eq!(headers[0], ("x-amz-date", "20261014T083000Z".to_string()));
        let auth = &headers[1].1;
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20261014/us-east-1/ec2/aws4_request, "
        ));
        assert!(auth.contains("SignedHeaders=content-type;host;x-amz-date, "));
        let signature = auth.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn session_token_is_signed_and_sent() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 8, 30, 0).unwrap();
        let headers = sign_post(
            &credentials(Some("token")),
            "eu-west-1",
            "ec2",
            "ec2.eu-west-1.amazonaws.com",
            "",
            now,
        )
        .unwrap();
        assert!(headers[1].1.contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token"));
        assert_eq!(headers[2], ("x-amz-security-token", "token".to_string()));
    }

    #[test]
    fn signature_depends_on_body() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 8, 30, 0).unwrap();
        let creds = credentials(None);
        let a = sign_post(&creds, "us-east-1", "ec2", "h", "Action=A", now).unwrap();
        let b = sign_post(&creds, "us-east-1", "ec2", "h", "Action=B", now).unwrap();
        let again = sign_post(&creds, "us-east-1", "ec2", "h", "Action=A", now).unwrap();
        assert_ne!(a[1].1, b[1].1);
        assert_eq!(a[1].1, again[1].1);
    }

    #[test]
    fn blank_secret_still_signs() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 8, 30, 0).unwrap();
        let creds = Credentials {
            access_key_id: "AKID".into(),
            secret_access_key: String::new(),
            session_token: None,
        };
        let headers = sign_post(&creds, "us-east-1", "ec2", "h", "", now).unwrap();
        assert!(headers[1].1.starts_with("AWS4-HMAC-SHA256 Credential=AKID/20261014/"));
        assert_eq!(signing_key("", "20261014", "us-east-1", "ec2").unwrap().len(), 32);
    }
}
