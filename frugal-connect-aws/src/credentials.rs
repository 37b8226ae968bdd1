//! Credentials artifact persistence
//!
//! The JSON hand-off file the Frugal product consumes. Field names are part
//! of the external contract and must stay byte-for-byte stable. Written with
//! owner-only permissions; the secret material never goes anywhere else.

use crate::api::AccessKey;
use crate::catalog::{role_arn, API_BASE_URL, INGEST_BASE_URL};
use crate::error::ConnectResult;
use crate::identity::ResolvedTarget;
use crate::provision::Provisioner;
use crate::types::{AccountId, Mode};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The persisted artifact. One file per principal name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialsArtifact {
    pub name: String,
    pub provider: String,
    pub primary_account_id: String,
    pub additional_account_ids: Vec<String>,
    /// Role ARN the product assumes (WIF mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wif_service_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wif_subject_id: Option<String>,
    /// Long-lived key pair (IAM-user mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    pub api_base_url: String,
    pub ingest_base_url: String,
    /// RFC 3339, second resolution
    pub created_at: String,
    /// Policy ARNs granted to the principal in every account
    pub permissions: Vec<String>,
}

impl CredentialsArtifact {
    /// Assemble the artifact for a completed provisioning run.
    pub fn for_run(
        target: &ResolvedTarget,
        provisioner: &Provisioner,
        provisioned_additional: &[AccountId],
        access_key: Option<&AccessKey>,
    ) -> Self {
        let (role, wif_service_account, wif_subject_id) = match &target.mode {
            Mode::Wif(wif) => (
                Some(role_arn(&target.primary, &target.principal_name)),
                Some(wif.service_account.clone()),
                Some(wif.subject_id.clone()),
            ),
            Mode::IamUser => (None, None, None),
        };
        Self {
            name: target.principal_name.clone(),
            provider: "aws".to_string(),
            primary_account_id: target.primary.to_string(),
            additional_account_ids: provisioned_additional
                .iter()
                .map(ToString::to_string)
                .collect(),
            role_arn: role,
            wif_service_account,
            wif_subject_id,
            access_key_id: access_key.map(|key| key.access_key_id.clone()),
            secret_access_key: access_key.map(|key| key.secret_access_key.clone()),
            api_base_url: API_BASE_URL.to_string(),
            ingest_base_url: INGEST_BASE_URL.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            permissions: provisioner
                .desired_for(&target.primary)
                .into_iter()
                .map(|(arn, _)| arn)
                .collect(),
        }
    }

    /// Write the artifact as pretty JSON with owner-only permissions.
    pub fn write(&self, path: &Path) -> ConnectResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_owner_only(path, &json)?;
        Ok(())
    }
}

/// Default artifact location for a principal name, in the working directory.
pub fn default_artifact_path(principal_name: &str) -> PathBuf {
    PathBuf::from(format!("frugal-aws-credentials-{principal_name}.json"))
}

/// Remove the artifact. Returns whether a file was actually removed; a
/// missing file is not an error.
pub fn remove_artifact(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
fn write_owner_only(path: &Path, contents: &str) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())?;
    file.write_all(b"\n")
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, contents: &str) -> io::Result<()> {
    fs::write(path, format!("{contents}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{resolve, SetupRequest};

    fn wif_target() -> ResolvedTarget {
        resolve(&SetupRequest {
            principal_name: "FrugalReadOnly".to_string(),
            primary_account: "123456789012".to_string(),
            wif: Some("sa@proj.iam.gserviceaccount.com:999111222".to_string()),
            additional_accounts: Some("210987654321".to_string()),
            org_accounts: None,
            admin_role: "OrganizationAccountAccessRole".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_wif_artifact_fields() {
        let provisioner = Provisioner::new();
        let additional = vec![AccountId::parse("210987654321").unwrap()];
        let artifact = CredentialsArtifact::for_run(&wif_target(), &provisioner, &additional, None);

        assert_eq!(artifact.provider, "aws");
        assert_eq!(
            artifact.role_arn.as_deref(),
            Some("arn:aws:iam::123456789012:role/FrugalReadOnly")
        );
        assert_eq!(artifact.wif_subject_id.as_deref(), Some("999111222"));
        assert!(artifact.access_key_id.is_none());
        assert_eq!(artifact.additional_account_ids, vec!["210987654321"]);
        assert!(!artifact.permissions.is_empty());
    }

    #[test]
    fn test_contract_field_names() {
        let provisioner = Provisioner::new();
        let artifact = CredentialsArtifact::for_run(&wif_target(), &provisioner, &[], None);
        let json = serde_json::to_string(&artifact).unwrap();

        // These names are the hand-off contract with the product.
        for field in [
            "\"name\"",
            "\"provider\"",
            "\"primary_account_id\"",
            "\"additional_account_ids\"",
            "\"role_arn\"",
            "\"wif_service_account\"",
            "\"wif_subject_id\"",
            "\"api_base_url\"",
            "\"ingest_base_url\"",
            "\"created_at\"",
            "\"permissions\"",
        ] {
            assert!(json.contains(field), "missing contract field {field}");
        }
        // Key-pair fields are omitted, not null, in WIF mode.
        assert!(!json.contains("access_key_id"));
    }

    #[test]
    fn test_write_and_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frugal-aws-credentials-FrugalReadOnly.json");
        let provisioner = Provisioner::new();
        let artifact = CredentialsArtifact::for_run(&wif_target(), &provisioner, &[], None);

        artifact.write(&path).unwrap();
        let parsed: CredentialsArtifact =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, artifact);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        assert!(remove_artifact(&path).unwrap());
        assert!(!remove_artifact(&path).unwrap());
    }

    #[test]
    fn test_default_artifact_path() {
        assert_eq!(
            default_artifact_path("FrugalReadOnly"),
            PathBuf::from("frugal-aws-credentials-FrugalReadOnly.json")
        );
    }
}
