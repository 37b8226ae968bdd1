//! Organization account discovery
//!
//! Expands an account filter into the concrete additional-account set. The
//! caller's own account is always excluded; it is the primary and handled
//! separately.

use crate::api::{CloudIdentityApi, OrgAccount};
use crate::error::{ApiError, DiscoveryError, ValidationError};
use crate::types::AccountId;
use regex::Regex;

/// Account status considered live for `all`, `ou:` and `Name=` filters.
const ACTIVE_STATUS: &str = "ACTIVE";

/// Parsed `--org-accounts` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    /// Every active account in the organization
    All,
    /// Active accounts directly under one organizational unit
    Ou(String),
    /// Active accounts whose display name matches a glob
    NameGlob(String),
    /// Accounts with a literal status value, e.g. `SUSPENDED`
    Status(String),
}

impl AccountFilter {
    /// Parse the filter grammar. Anything unrecognized is a validation
    /// error, raised before any network call.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw == "all" {
            return Ok(Self::All);
        }
        if let Some(ou_id) = raw.strip_prefix("ou:") {
            if !ou_id.is_empty() {
                return Ok(Self::Ou(ou_id.to_string()));
            }
        }
        if let Some(glob) = raw.strip_prefix("Name=") {
            if !glob.is_empty() {
                return Ok(Self::NameGlob(glob.to_string()));
            }
        }
        if let Some(status) = raw.strip_prefix("Status=") {
            if !status.is_empty() {
                return Ok(Self::Status(status.to_string()));
            }
        }
        Err(ValidationError::InvalidAccountFilter(raw.to_string()))
    }
}

/// Result of a discovery pass.
#[derive(Debug)]
pub struct DiscoveryReport {
    /// Discovered additional accounts, sorted and deduplicated
    pub accounts: Vec<AccountId>,
    /// Advisory warning when the caller is not (or cannot be confirmed as)
    /// the organization's management account
    pub management_warning: Option<String>,
}

/// Expand `filter` against the organization. A failing Organizations listing
/// is a hard error here: discovery was explicitly requested, so there is no
/// silent fallback to an empty set.
pub async fn discover(
    api: &dyn CloudIdentityApi,
    filter: &AccountFilter,
    caller_account: &AccountId,
) -> Result<DiscoveryReport, DiscoveryError> {
    let management_warning = match api.describe_organization().await {
        Ok(info) if info.management_account_id == *caller_account => None,
        Ok(info) => Some(format!(
            "account {caller_account} is not the organization's management account \
             ({}); consolidated billing visibility will be degraded",
            info.management_account_id
        )),
        Err(err) => Some(format!(
            "could not confirm the management account ({err}); proceeding as a member account"
        )),
    };

    let listed = match filter {
        AccountFilter::All => active_only(list_all(api).await?),
        AccountFilter::Ou(ou_id) => active_only(
            api.list_accounts_for_parent(ou_id)
                .await
                .map_err(unavailable)?,
        ),
        AccountFilter::NameGlob(glob) => {
            let pattern = glob_regex(glob);
            active_only(list_all(api).await?)
                .into_iter()
                .filter(|account| pattern.is_match(&account.name))
                .collect()
        }
        AccountFilter::Status(status) => list_all(api)
            .await?
            .into_iter()
            .filter(|account| account.status == *status)
            .collect(),
    };

    let mut accounts: Vec<AccountId> = listed
        .into_iter()
        .map(|account| account.id)
        .filter(|id| id != caller_account)
        .collect();
    accounts.sort();
    accounts.dedup();

    Ok(DiscoveryReport {
        accounts,
        management_warning,
    })
}

async fn list_all(api: &dyn CloudIdentityApi) -> Result<Vec<OrgAccount>, DiscoveryError> {
    api.list_organization_accounts().await.map_err(unavailable)
}

fn unavailable(err: ApiError) -> DiscoveryError {
    DiscoveryError::Unavailable(err.to_string())
}

fn active_only(accounts: Vec<OrgAccount>) -> Vec<OrgAccount> {
    accounts
        .into_iter()
        .filter(|account| account.status == ACTIVE_STATUS)
        .collect()
}

/// Translate a display-name glob to an anchored regex. `*` matches any
/// sequence; everything else is literal.
fn glob_regex(glob: &str) -> Regex {
    let escaped = regex::escape(glob).replace(r"\*", ".*");
    Regex::new(&format!("^{escaped}$")).expect("escaped glob is a valid regex pattern")
}
