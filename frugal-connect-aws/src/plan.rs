//! Plan computation
//!
//! A plan is a pure read+diff pass: it probes current state and predicts the
//! attachments apply would perform, mutating nothing. It reads the desired
//! list through the same [`Provisioner`] apply uses, so plan-time and
//! apply-time enumeration cannot diverge.

use crate::api::CloudIdentityApi;
use crate::broker::CredentialBroker;
use crate::error::{ApiError, ConnectError, ProvisionError};
use crate::identity::ResolvedTarget;
use crate::provision::Provisioner;
use crate::types::{AccountRef, AccountRole, PrincipalKind};
use std::path::PathBuf;

/// Predicted fate of one desired policy on one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStatus {
    AlreadyAttached,
    WillAttach,
}

/// One desired policy with its predicted status.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub policy_arn: String,
    pub description: String,
    pub status: PolicyStatus,
}

/// Plan for a single account.
#[derive(Debug, Clone)]
pub struct AccountPlan {
    pub account: AccountRef,
    pub principal_exists: bool,
    /// Set when the account could not be probed (admin role unassumable at
    /// plan time); every entry is then predicted as will-attach and apply
    /// re-attempts the assumption.
    pub probe_error: Option<String>,
    pub entries: Vec<PlanEntry>,
}

/// The full pre-confirmation plan for a provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    pub principal_name: String,
    pub accounts: Vec<AccountPlan>,
}

impl ProvisioningPlan {
    /// Probe every account in the run and predict the attachments apply
    /// will perform. Read-only; the primary account is probed with the base
    /// handle, additional accounts through the broker.
    pub async fn compute(
        api: &dyn CloudIdentityApi,
        broker: &CredentialBroker,
        provisioner: &Provisioner,
        target: &ResolvedTarget,
        accounts: &[AccountRef],
    ) -> Result<Self, ConnectError> {
        let mut account_plans = Vec::with_capacity(accounts.len());

        for account in accounts {
            let plan = if account.is_primary {
                probe_account(
                    api,
                    provisioner,
                    account,
                    &target.principal_name,
                    target.mode.principal_kind_for(AccountRole::Primary),
                )
                .await
                .map_err(|err| ConnectError::Provision(ProvisionError::Api(err)))?
            } else {
                let probed = broker
                    .with_assumed_role(&account.id, &target.admin_role, |scoped| async move {
                        probe_account(
                            scoped.as_ref(),
                            provisioner,
                            account,
                            &target.principal_name,
                            PrincipalKind::Role,
                        )
                        .await
                    })
                    .await;
                match probed {
                    Ok(Ok(plan)) => plan,
                    Ok(Err(api_err)) => unprobed(provisioner, account, api_err.to_string()),
                    Err(assume_err) => unprobed(provisioner, account, assume_err.to_string()),
                }
            };
            account_plans.push(plan);
        }

        Ok(Self {
            principal_name: target.principal_name.clone(),
            accounts: account_plans,
        })
    }

    /// Number of attachments apply is predicted to perform.
    pub fn pending_attachments(&self) -> usize {
        self.accounts
            .iter()
            .flat_map(|account| account.entries.iter())
            .filter(|entry| entry.status == PolicyStatus::WillAttach)
            .count()
    }
}

async fn probe_account(
    api: &dyn CloudIdentityApi,
    provisioner: &Provisioner,
    account: &AccountRef,
    principal_name: &str,
    kind: PrincipalKind,
) -> Result<AccountPlan, ApiError> {
    let principal_exists = match kind {
        PrincipalKind::Role => api.role_exists(principal_name).await?,
        PrincipalKind::User => api.user_exists(principal_name).await?,
    };
    let attached = if principal_exists {
        api.list_attached_policies(kind, principal_name).await?
    } else {
        Vec::new()
    };
    let entries = provisioner
        .desired_for(&account.id)
        .into_iter()
        .map(|(policy_arn, description)| {
            let status = if attached.contains(&policy_arn) {
                PolicyStatus::AlreadyAttached
            } else {
                PolicyStatus::WillAttach
            };
            PlanEntry {
                policy_arn,
                description,
                status,
            }
        })
        .collect();
    Ok(AccountPlan {
        account: account.clone(),
        principal_exists,
        probe_error: None,
        entries,
    })
}

fn unprobed(provisioner: &Provisioner, account: &AccountRef, error: String) -> AccountPlan {
    let entries = provisioner
        .desired_for(&account.id)
        .into_iter()
        .map(|(policy_arn, description)| PlanEntry {
            policy_arn,
            description,
            status: PolicyStatus::WillAttach,
        })
        .collect();
    AccountPlan {
        account: account.clone(),
        principal_exists: false,
        probe_error: Some(error),
        entries,
    }
}

/// What `--undo` is about to remove. Built from the same account enumeration
/// as provisioning; displayed for confirmation, then executed best-effort.
#[derive(Debug, Clone)]
pub struct UndoPlan {
    pub principal_name: String,
    pub accounts: Vec<AccountRef>,
    pub artifact_path: PathBuf,
}
