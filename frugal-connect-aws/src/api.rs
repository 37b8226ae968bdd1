//! Cloud control-plane capability interface
//!
//! Everything the connector needs from the provider, as one async trait. The
//! production implementation wraps the AWS SDK clients; tests substitute an
//! in-memory fake. A handle is always scoped to a single account: the base
//! handle to the caller's own, scoped handles (built by the factory from a
//! temporary credential triple) to the account that issued the triple.

use crate::error::ApiError;
use crate::policy::PolicyDocument;
use crate::types::{AccountId, PrincipalKind, TemporaryCredentialSet};
use async_trait::async_trait;
use std::sync::Arc;

/// Identity of the credentials behind an API handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account_id: AccountId,
    pub arn: String,
}

/// A freshly created access key pair. The secret is only ever available
/// here, at creation time.
#[derive(Debug, Clone)]
pub struct AccessKey {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Organization description, reduced to what discovery needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationInfo {
    pub management_account_id: AccountId,
}

/// One member account as reported by the organization listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgAccount {
    pub id: AccountId,
    pub name: String,
    pub status: String,
}

/// Control-plane operations the connector depends on.
#[async_trait]
pub trait CloudIdentityApi: Send + Sync {
    async fn caller_identity(&self) -> Result<CallerIdentity, ApiError>;

    async fn role_exists(&self, name: &str) -> Result<bool, ApiError>;

    async fn user_exists(&self, name: &str) -> Result<bool, ApiError>;

    async fn create_role(
        &self,
        name: &str,
        trust_policy: &PolicyDocument,
        tags: &[(String, String)],
    ) -> Result<(), ApiError>;

    async fn create_user(&self, name: &str, tags: &[(String, String)]) -> Result<(), ApiError>;

    async fn attach_managed_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_arn: &str,
    ) -> Result<(), ApiError>;

    async fn detach_managed_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_arn: &str,
    ) -> Result<(), ApiError>;

    async fn list_attached_policies(
        &self,
        kind: PrincipalKind,
        name: &str,
    ) -> Result<Vec<String>, ApiError>;

    async fn policy_exists(&self, policy_arn: &str) -> Result<bool, ApiError>;

    /// Create a customer-managed policy and return its ARN. A name collision
    /// surfaces as [`ApiError::AlreadyExists`]; callers that probed first
    /// treat it as success-equivalent.
    async fn create_policy(
        &self,
        name: &str,
        document: &PolicyDocument,
        description: &str,
    ) -> Result<String, ApiError>;

    async fn delete_policy(&self, policy_arn: &str) -> Result<(), ApiError>;

    async fn put_inline_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_name: &str,
        document: &PolicyDocument,
    ) -> Result<(), ApiError>;

    async fn delete_inline_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_name: &str,
    ) -> Result<(), ApiError>;

    /// Create an access key for a user. The provider's two-key quota
    /// surfaces as [`ApiError::LimitExceeded`].
    async fn create_access_key(&self, user_name: &str) -> Result<AccessKey, ApiError>;

    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<String>, ApiError>;

    async fn delete_access_key(
        &self,
        user_name: &str,
        access_key_id: &str,
    ) -> Result<(), ApiError>;

    async fn delete_role(&self, name: &str) -> Result<(), ApiError>;

    async fn delete_user(&self, name: &str) -> Result<(), ApiError>;

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration_secs: i32,
    ) -> Result<TemporaryCredentialSet, ApiError>;

    /// Describe the organization. Callers outside the management account
    /// typically receive [`ApiError::NotAuthorized`].
    async fn describe_organization(&self) -> Result<OrganizationInfo, ApiError>;

    async fn list_organization_accounts(&self) -> Result<Vec<OrgAccount>, ApiError>;

    async fn list_accounts_for_parent(&self, parent_id: &str) -> Result<Vec<OrgAccount>, ApiError>;
}

/// Builds API handles scoped to a temporary credential triple. The seam that
/// lets the broker hand out per-account handles without ever touching the
/// base handle's credentials.
#[async_trait]
pub trait ScopedApiFactory: Send + Sync {
    async fn scoped(&self, credentials: &TemporaryCredentialSet) -> Arc<dyn CloudIdentityApi>;
}
