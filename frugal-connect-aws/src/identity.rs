//! Identity and account resolution
//!
//! Turns the raw argument surface into a validated run target. Everything
//! here fails fast, before any network call: a bad account id, WIF
//! parameter or filter never reaches the provider.

use crate::discovery::AccountFilter;
use crate::error::ValidationError;
use crate::types::{AccountId, Mode, WifIdentity};
use regex::Regex;
use std::sync::LazyLock;

/// Google service account address shape
static SERVICE_ACCOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9._-]*@[a-z0-9][a-z0-9-]*\.iam\.gserviceaccount\.com$")
        .expect("valid service account regex pattern")
});

/// IAM principal name character rules
static PRINCIPAL_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9+=,.@_-]{1,64}$").expect("valid name regex pattern"));

/// Raw inputs exactly as they arrived on the command line.
#[derive(Debug, Clone)]
pub struct SetupRequest {
    pub principal_name: String,
    pub primary_account: String,
    pub wif: Option<String>,
    pub additional_accounts: Option<String>,
    pub org_accounts: Option<String>,
    pub admin_role: String,
}

/// How the additional-account set gets populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdditionalAccounts {
    /// Single-account run
    None,
    /// Explicit `--additional-accounts` list, already validated
    Explicit(Vec<AccountId>),
    /// Deferred to organization discovery with this filter
    OrgFilter(AccountFilter),
}

/// A fully validated run target. Mode and account set are fixed here and
/// never re-derived downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub principal_name: String,
    pub primary: AccountId,
    pub mode: Mode,
    /// Admin role assumed in member accounts to provision them
    pub admin_role: String,
    pub additional: AdditionalAccounts,
}

/// Validate the raw request into a [`ResolvedTarget`].
pub fn resolve(request: &SetupRequest) -> Result<ResolvedTarget, ValidationError> {
    if !PRINCIPAL_NAME_PATTERN.is_match(&request.principal_name) {
        return Err(ValidationError::InvalidPrincipalName(
            request.principal_name.clone(),
        ));
    }

    let primary = AccountId::parse(&request.primary_account)?;

    let mode = match &request.wif {
        Some(raw) => Mode::Wif(parse_wif_identity(raw)?),
        None => Mode::IamUser,
    };

    let additional = match (&request.additional_accounts, &request.org_accounts) {
        (Some(_), Some(_)) => return Err(ValidationError::ConflictingAccountSources),
        (Some(csv), None) => {
            AdditionalAccounts::Explicit(parse_additional_accounts(csv, &primary)?)
        }
        (None, Some(filter)) => AdditionalAccounts::OrgFilter(AccountFilter::parse(filter)?),
        (None, None) => AdditionalAccounts::None,
    };

    Ok(ResolvedTarget {
        principal_name: request.principal_name.clone(),
        primary,
        mode,
        admin_role: request.admin_role.clone(),
        additional,
    })
}

/// Parse a `--wif` parameter.
///
/// The supported form is `<service-account-email>:<numeric-subject-id>`. The
/// legacy email-only form recovers the subject id from a leading numeric
/// prefix of the local part; that heuristic is tied to an old naming
/// convention and is kept as a deprecated best-effort path only.
pub fn parse_wif_identity(raw: &str) -> Result<WifIdentity, ValidationError> {
    let raw = raw.trim();
    match raw.split_once(':') {
        Some((email, subject)) => {
            if SERVICE_ACCOUNT_PATTERN.is_match(email)
                && !subject.is_empty()
                && subject.chars().all(|c| c.is_ascii_digit())
            {
                Ok(WifIdentity {
                    service_account: email.to_string(),
                    subject_id: subject.to_string(),
                })
            } else {
                Err(ValidationError::InvalidServiceAccountFormat(
                    raw.to_string(),
                ))
            }
        }
        None => {
            if !SERVICE_ACCOUNT_PATTERN.is_match(raw) {
                return Err(ValidationError::InvalidServiceAccountFormat(
                    raw.to_string(),
                ));
            }
            let local_part = raw.split('@').next().unwrap_or_default();
            let subject_id: String = local_part
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if subject_id.is_empty() {
                return Err(ValidationError::InvalidServiceAccountFormat(
                    raw.to_string(),
                ));
            }
            log::warn!(
                "email-only --wif form is deprecated: recovered subject id {subject_id} from \
                 '{raw}'; pass <email>:<subject-id> explicitly"
            );
            Ok(WifIdentity {
                service_account: raw.to_string(),
                subject_id,
            })
        }
    }
}

/// Parse a comma-separated `--additional-accounts` list. All-or-nothing: any
/// invalid element rejects the entire list. The primary account is dropped
/// with a note if it sneaks in.
pub fn parse_additional_accounts(
    csv: &str,
    primary: &AccountId,
) -> Result<Vec<AccountId>, ValidationError> {
    let mut accounts = Vec::new();
    for element in csv.split(',') {
        let id = AccountId::parse(element)?;
        if id == *primary {
            log::info!("ignoring primary account {id} in --additional-accounts");
            continue;
        }
        if !accounts.contains(&id) {
            accounts.push(id);
        }
    }
    Ok(accounts)
}
