//! Core domain types for the Frugal AWS connector

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 12-digit AWS account id, validated at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Parse an account id, enforcing the exactly-12-digits rule.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        if value.len() == 12 && value.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(value.to_string()))
        } else {
            Err(ValidationError::InvalidAccountId(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One account under management for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    pub id: AccountId,
    /// The primary account is reached with the caller's own credentials;
    /// every other account only ever through an assumed role.
    pub is_primary: bool,
}

impl AccountRef {
    pub fn primary(id: AccountId) -> Self {
        Self {
            id,
            is_primary: true,
        }
    }

    pub fn additional(id: AccountId) -> Self {
        Self {
            id,
            is_primary: false,
        }
    }
}

/// Whether an account is the primary or an additional one. Together with
/// [`Mode`] this fully determines the trust-policy shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRole {
    Primary,
    Additional,
}

/// Operating mode, decided once at parse time and matched exhaustively at
/// every branch point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Workload Identity Federation: a Google service account token is
    /// exchanged for temporary role credentials, no long-lived keys.
    Wif(WifIdentity),
    /// Classic IAM user with an access key pair.
    IamUser,
}

impl Mode {
    pub fn principal_kind(&self) -> PrincipalKind {
        match self {
            Self::Wif(_) => PrincipalKind::Role,
            Self::IamUser => PrincipalKind::User,
        }
    }

    /// Kind of principal this mode creates in a given account. Additional
    /// accounts always carry a role chained to the primary principal; only
    /// the primary account's kind depends on the mode.
    pub fn principal_kind_for(&self, account_role: AccountRole) -> PrincipalKind {
        match account_role {
            AccountRole::Primary => self.principal_kind(),
            AccountRole::Additional => PrincipalKind::Role,
        }
    }
}

/// The federated identity a WIF trust policy admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifIdentity {
    /// Google service account address, e.g. `sa@proj.iam.gserviceaccount.com`
    pub service_account: String,
    /// Numeric unique id of the service account; used as both the subject
    /// and the audience condition of the OIDC trust policy.
    pub subject_id: String,
}

/// Kind of IAM principal the connector creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalKind {
    Role,
    User,
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role => f.write_str("role"),
            Self::User => f.write_str("user"),
        }
    }
}

/// A principal that exists (or is about to exist) in a specific account.
///
/// The name is identical across every account of a run, so the ARN can be
/// constructed from an account id and the shared name alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalRef {
    pub kind: PrincipalKind,
    pub name: String,
    pub account_id: AccountId,
}

impl PrincipalRef {
    pub fn new(kind: PrincipalKind, name: &str, account_id: AccountId) -> Self {
        Self {
            kind,
            name: name.to_string(),
            account_id,
        }
    }

    pub fn arn(&self) -> String {
        format!(
            "arn:aws:iam::{}:{}/{}",
            self.account_id, self.kind, self.name
        )
    }
}

/// The credential triple returned by an AssumeRole call. Lives only for the
/// duration of provisioning a single additional account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryCredentialSet {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_parse_valid() {
        let id = AccountId::parse("123456789012").unwrap();
        assert_eq!(id.as_str(), "123456789012");
    }

    #[test]
    fn test_account_id_parse_trims_whitespace() {
        let id = AccountId::parse(" 123456789012 ").unwrap();
        assert_eq!(id.as_str(), "123456789012");
    }

    #[test]
    fn test_account_id_parse_rejects_wrong_length() {
        assert!(AccountId::parse("12345678901").is_err());
        assert!(AccountId::parse("1234567890123").is_err());
        assert!(AccountId::parse("").is_err());
    }

    #[test]
    fn test_account_id_parse_rejects_non_digits() {
        assert!(AccountId::parse("12345678901a").is_err());
        assert!(AccountId::parse("arn:aws:iam::123456789012").is_err());
    }

    #[test]
    fn test_principal_arn_role() {
        let principal = PrincipalRef::new(
            PrincipalKind::Role,
            "FrugalReadOnly",
            AccountId::parse("123456789012").unwrap(),
        );
        assert_eq!(
            principal.arn(),
            "arn:aws:iam::123456789012:role/FrugalReadOnly"
        );
    }

    #[test]
    fn test_principal_arn_user() {
        let principal = PrincipalRef::new(
            PrincipalKind::User,
            "frugal-reader",
            AccountId::parse("210987654321").unwrap(),
        );
        assert_eq!(
            principal.arn(),
            "arn:aws:iam::210987654321:user/frugal-reader"
        );
    }

    #[test]
    fn test_mode_principal_kind() {
        let wif = Mode::Wif(WifIdentity {
            service_account: "sa@proj.iam.gserviceaccount.com".to_string(),
            subject_id: "999111222".to_string(),
        });
        assert_eq!(wif.principal_kind(), PrincipalKind::Role);
        assert_eq!(Mode::IamUser.principal_kind(), PrincipalKind::User);
    }
}
