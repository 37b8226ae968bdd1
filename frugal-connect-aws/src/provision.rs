//! Principal and policy provisioning
//!
//! Everything here is idempotent by existence-check-then-create: running the
//! same provisioning pass twice yields the same final state, with the second
//! pass reporting zero additions.

use crate::api::{AccessKey, CloudIdentityApi};
use crate::catalog::{
    assume_member_roles_document, custom_policy_arn, custom_policy_document, ManagedPolicySpec,
    CUSTOM_POLICY_NAME, INLINE_ASSUME_POLICY_NAME, MANAGED_POLICIES, MANAGED_TAG,
};
use crate::error::{ApiError, ProvisionError};
use crate::trust::TrustPolicyKind;
use crate::types::{AccountId, PrincipalKind, PrincipalRef};
use log::{debug, info};

/// Exact counts from one attachment reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachmentOutcome {
    pub added: usize,
    pub skipped: usize,
}

/// Creates principals and reconciles their policy attachments. The desired
/// policy set is injected as a fixed table; plan computation reads the same
/// table through [`Provisioner::desired_for`].
pub struct Provisioner {
    managed_policies: &'static [ManagedPolicySpec],
    tags: Vec<(String, String)>,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl Provisioner {
    pub fn new() -> Self {
        Self::with_policies(MANAGED_POLICIES)
    }

    pub fn with_policies(managed_policies: &'static [ManagedPolicySpec]) -> Self {
        Self {
            managed_policies,
            tags: vec![(MANAGED_TAG.0.to_string(), MANAGED_TAG.1.to_string())],
        }
    }

    /// The full desired (arn, description) attachment list for one account:
    /// the managed table plus the per-account custom policy. Plan and apply
    /// both read this; they cannot diverge.
    pub fn desired_for(&self, account_id: &AccountId) -> Vec<(String, String)> {
        let mut desired: Vec<(String, String)> = self
            .managed_policies
            .iter()
            .map(|spec| (spec.arn.to_string(), spec.description.to_string()))
            .collect();
        desired.push((
            custom_policy_arn(account_id),
            "bespoke cost/billing/log read-only grant".to_string(),
        ));
        desired
    }

    /// Create the connector role if absent. An existing role is reused, not
    /// an error.
    pub async fn ensure_role(
        &self,
        api: &dyn CloudIdentityApi,
        account_id: &AccountId,
        name: &str,
        trust: &TrustPolicyKind,
    ) -> Result<PrincipalRef, ProvisionError> {
        if api.role_exists(name).await? {
            info!("role {name} already exists in {account_id}, reusing it");
        } else {
            api.create_role(name, &trust.document(), &self.tags).await?;
            info!("created role {name} in {account_id}");
        }
        Ok(PrincipalRef::new(
            PrincipalKind::Role,
            name,
            account_id.clone(),
        ))
    }

    /// Create the connector user if absent.
    pub async fn ensure_user(
        &self,
        api: &dyn CloudIdentityApi,
        account_id: &AccountId,
        name: &str,
    ) -> Result<PrincipalRef, ProvisionError> {
        if api.user_exists(name).await? {
            info!("user {name} already exists in {account_id}, reusing it");
        } else {
            api.create_user(name, &self.tags).await?;
            info!("created user {name} in {account_id}");
        }
        Ok(PrincipalRef::new(
            PrincipalKind::User,
            name,
            account_id.clone(),
        ))
    }

    /// Create the custom least-privilege policy if absent, keyed by the
    /// expected ARN. A concurrent create reporting the name as taken is
    /// success-equivalent.
    pub async fn ensure_custom_policy(
        &self,
        api: &dyn CloudIdentityApi,
        account_id: &AccountId,
    ) -> Result<String, ProvisionError> {
        let expected_arn = custom_policy_arn(account_id);
        if api.policy_exists(&expected_arn).await? {
            debug!("custom policy already present at {expected_arn}");
            return Ok(expected_arn);
        }
        match api
            .create_policy(
                CUSTOM_POLICY_NAME,
                &custom_policy_document(),
                "Read-only cost, billing and log access for Frugal",
            )
            .await
        {
            Ok(arn) => {
                info!("created policy {CUSTOM_POLICY_NAME} in {account_id}");
                Ok(arn)
            }
            Err(ApiError::AlreadyExists(_)) => Ok(expected_arn),
            Err(err) => Err(err.into()),
        }
    }

    /// Reconcile the principal's attachments against the desired list:
    /// attach what is missing, count what was already there. Nothing is ever
    /// detached here.
    pub async fn reconcile_attachments(
        &self,
        api: &dyn CloudIdentityApi,
        principal: &PrincipalRef,
    ) -> Result<AttachmentOutcome, ProvisionError> {
        let attached = api
            .list_attached_policies(principal.kind, &principal.name)
            .await?;
        let mut outcome = AttachmentOutcome::default();
        for (arn, _) in self.desired_for(&principal.account_id) {
            if attached.contains(&arn) {
                debug!("{arn} already attached to {}", principal.name);
                outcome.skipped += 1;
            } else {
                api.attach_managed_policy(principal.kind, &principal.name, &arn)
                    .await?;
                outcome.added += 1;
            }
        }
        Ok(outcome)
    }

    /// Attach the inline statement permitting `sts:AssumeRole` on the
    /// connector role in any account. Applied to the primary principal of a
    /// multi-account run; PutPolicy semantics make it an overwrite.
    pub async fn grant_member_role_access(
        &self,
        api: &dyn CloudIdentityApi,
        principal: &PrincipalRef,
    ) -> Result<(), ProvisionError> {
        api.put_inline_policy(
            principal.kind,
            &principal.name,
            INLINE_ASSUME_POLICY_NAME,
            &assume_member_roles_document(&principal.name),
        )
        .await?;
        info!(
            "granted {} permission to assume member-account roles",
            principal.name
        );
        Ok(())
    }

    /// Create an access key for the user principal, translating the
    /// provider's key quota into an actionable error.
    pub async fn create_access_key(
        &self,
        api: &dyn CloudIdentityApi,
        user_name: &str,
    ) -> Result<AccessKey, ProvisionError> {
        match api.create_access_key(user_name).await {
            Ok(key) => Ok(key),
            Err(ApiError::LimitExceeded(user)) => Err(ProvisionError::AccessKeyLimit { user }),
            Err(err) => Err(err.into()),
        }
    }
}
