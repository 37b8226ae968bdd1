//! AWS implementation of the [`CloudIdentityApi`] capability
//!
//! Wraps the IAM, STS and Organizations clients. Scoped handles are built
//! from a temporary credential triple through a dedicated config loader, so
//! the base handle's credentials are never swapped underneath it.

use crate::api::{
    AccessKey, CallerIdentity, CloudIdentityApi, OrgAccount, OrganizationInfo, ScopedApiFactory,
};
use crate::error::ApiError;
use crate::policy::PolicyDocument;
use crate::types::{AccountId, PrincipalKind, TemporaryCredentialSet};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use std::sync::Arc;

/// Provider name recorded on credentials built from an assumed session.
const SCOPED_PROVIDER_NAME: &str = "frugal-connect-assume-role";

/// Production API handle over the AWS SDK clients.
pub struct AwsCloudIdentityApi {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
    organizations: aws_sdk_organizations::Client,
}

impl AwsCloudIdentityApi {
    /// Build a handle from the ambient credential chain (env, profile,
    /// instance metadata), optionally pinning the region.
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        Self::from_config(&config)
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        Self {
            iam: aws_sdk_iam::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
            organizations: aws_sdk_organizations::Client::new(config),
        }
    }

    fn serialize_document(document: &PolicyDocument) -> Result<String, ApiError> {
        serde_json::to_string(document).map_err(|e| ApiError::call("SerializePolicyDocument", e))
    }

    fn iam_tags(tags: &[(String, String)]) -> Result<Vec<aws_sdk_iam::types::Tag>, ApiError> {
        tags.iter()
            .map(|(key, value)| {
                aws_sdk_iam::types::Tag::builder()
                    .key(key)
                    .value(value)
                    .build()
                    .map_err(|e| ApiError::call("BuildTag", e))
            })
            .collect()
    }
}

fn org_account(account: &aws_sdk_organizations::types::Account) -> Option<OrgAccount> {
    let id = AccountId::parse(account.id()?).ok()?;
    Some(OrgAccount {
        id,
        name: account.name().unwrap_or_default().to_string(),
        status: account
            .status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
    })
}

#[async_trait]
impl CloudIdentityApi for AwsCloudIdentityApi {
    async fn caller_identity(&self) -> Result<CallerIdentity, ApiError> {
        let out = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| ApiError::call("GetCallerIdentity", e))?;
        let account = out
            .account()
            .ok_or_else(|| ApiError::call("GetCallerIdentity", "response missing Account"))?;
        let account_id = AccountId::parse(account)
            .map_err(|e| ApiError::call("GetCallerIdentity", e))?;
        Ok(CallerIdentity {
            account_id,
            arn: out.arn().unwrap_or_default().to_string(),
        })
    }

    async fn role_exists(&self, name: &str) -> Result<bool, ApiError> {
        match self.iam.get_role().role_name(name).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_entity_exception() {
                    Ok(false)
                } else {
                    Err(ApiError::call("GetRole", service_err))
                }
            }
        }
    }

    async fn user_exists(&self, name: &str) -> Result<bool, ApiError> {
        match self.iam.get_user().user_name(name).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_entity_exception() {
                    Ok(false)
                } else {
                    Err(ApiError::call("GetUser", service_err))
                }
            }
        }
    }

    async fn create_role(
        &self,
        name: &str,
        trust_policy: &PolicyDocument,
        tags: &[(String, String)],
    ) -> Result<(), ApiError> {
        self.iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(Self::serialize_document(trust_policy)?)
            .set_tags(Some(Self::iam_tags(tags)?))
            .send()
            .await
            .map_err(|e| ApiError::call("CreateRole", e))?;
        Ok(())
    }

    async fn create_user(&self, name: &str, tags: &[(String, String)]) -> Result<(), ApiError> {
        self.iam
            .create_user()
            .user_name(name)
            .set_tags(Some(Self::iam_tags(tags)?))
            .send()
            .await
            .map_err(|e| ApiError::call("CreateUser", e))?;
        Ok(())
    }

    async fn attach_managed_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_arn: &str,
    ) -> Result<(), ApiError> {
        match kind {
            PrincipalKind::Role => self
                .iam
                .attach_role_policy()
                .role_name(name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| ApiError::call("AttachRolePolicy", e)),
            PrincipalKind::User => self
                .iam
                .attach_user_policy()
                .user_name(name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| ApiError::call("AttachUserPolicy", e)),
        }
    }

    async fn detach_managed_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_arn: &str,
    ) -> Result<(), ApiError> {
        match kind {
            PrincipalKind::Role => self
                .iam
                .detach_role_policy()
                .role_name(name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| ApiError::call("DetachRolePolicy", e)),
            PrincipalKind::User => self
                .iam
                .detach_user_policy()
                .user_name(name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| ApiError::call("DetachUserPolicy", e)),
        }
    }

    async fn list_attached_policies(
        &self,
        kind: PrincipalKind,
        name: &str,
    ) -> Result<Vec<String>, ApiError> {
        let mut arns = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            match kind {
                PrincipalKind::Role => {
                    let mut request = self.iam.list_attached_role_policies().role_name(name);
                    if let Some(m) = marker.take() {
                        request = request.marker(m);
                    }
                    let response = request
                        .send()
                        .await
                        .map_err(|e| ApiError::call("ListAttachedRolePolicies", e))?;
                    for policy in response.attached_policies() {
                        if let Some(arn) = policy.policy_arn() {
                            arns.push(arn.to_string());
                        }
                    }
                    marker = response.marker().map(|m| m.to_string());
                    if !response.is_truncated() {
                        break;
                    }
                }
                PrincipalKind::User => {
                    let mut request = self.iam.list_attached_user_policies().user_name(name);
                    if let Some(m) = marker.take() {
                        request = request.marker(m);
                    }
                    let response = request
                        .send()
                        .await
                        .map_err(|e| ApiError::call("ListAttachedUserPolicies", e))?;
                    for policy in response.attached_policies() {
                        if let Some(arn) = policy.policy_arn() {
                            arns.push(arn.to_string());
                        }
                    }
                    marker = response.marker().map(|m| m.to_string());
                    if !response.is_truncated() {
                        break;
                    }
                }
            }
        }

        Ok(arns)
    }

    async fn policy_exists(&self, policy_arn: &str) -> Result<bool, ApiError> {
        match self.iam.get_policy().policy_arn(policy_arn).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_entity_exception() {
                    Ok(false)
                } else {
                    Err(ApiError::call("GetPolicy", service_err))
                }
            }
        }
    }

    async fn create_policy(
        &self,
        name: &str,
        document: &PolicyDocument,
        description: &str,
    ) -> Result<String, ApiError> {
        let response = self
            .iam
            .create_policy()
            .policy_name(name)
            .policy_document(Self::serialize_document(document)?)
            .description(description)
            .send()
            .await;
        match response {
            Ok(out) => Ok(out
                .policy()
                .and_then(|p| p.arn())
                .unwrap_or_default()
                .to_string()),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_entity_already_exists_exception() {
                    Err(ApiError::AlreadyExists(name.to_string()))
                } else {
                    Err(ApiError::call("CreatePolicy", service_err))
                }
            }
        }
    }

    async fn delete_policy(&self, policy_arn: &str) -> Result<(), ApiError> {
        self.iam
            .delete_policy()
            .policy_arn(policy_arn)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ApiError::call("DeletePolicy", e))
    }

    async fn put_inline_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_name: &str,
        document: &PolicyDocument,
    ) -> Result<(), ApiError> {
        let document = Self::serialize_document(document)?;
        match kind {
            PrincipalKind::Role => self
                .iam
                .put_role_policy()
                .role_name(name)
                .policy_name(policy_name)
                .policy_document(document)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| ApiError::call("PutRolePolicy", e)),
            PrincipalKind::User => self
                .iam
                .put_user_policy()
                .user_name(name)
                .policy_name(policy_name)
                .policy_document(document)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| ApiError::call("PutUserPolicy", e)),
        }
    }

    async fn delete_inline_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_name: &str,
    ) -> Result<(), ApiError> {
        match kind {
            PrincipalKind::Role => self
                .iam
                .delete_role_policy()
                .role_name(name)
                .policy_name(policy_name)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| ApiError::call("DeleteRolePolicy", e)),
            PrincipalKind::User => self
                .iam
                .delete_user_policy()
                .user_name(name)
                .policy_name(policy_name)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| ApiError::call("DeleteUserPolicy", e)),
        }
    }

    async fn create_access_key(&self, user_name: &str) -> Result<AccessKey, ApiError> {
        let response = self
            .iam
            .create_access_key()
            .user_name(user_name)
            .send()
            .await;
        match response {
            Ok(out) => {
                let key = out.access_key().ok_or_else(|| {
                    ApiError::call("CreateAccessKey", "response missing AccessKey")
                })?;
                Ok(AccessKey {
                    access_key_id: key.access_key_id().to_string(),
                    secret_access_key: key.secret_access_key().to_string(),
                })
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_limit_exceeded_exception() {
                    Err(ApiError::LimitExceeded(user_name.to_string()))
                } else {
                    Err(ApiError::call("CreateAccessKey", service_err))
                }
            }
        }
    }

    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<String>, ApiError> {
        let response = self
            .iam
            .list_access_keys()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| ApiError::call("ListAccessKeys", e))?;
        Ok(response
            .access_key_metadata()
            .iter()
            .filter_map(|meta| meta.access_key_id().map(|id| id.to_string()))
            .collect())
    }

    async fn delete_access_key(
        &self,
        user_name: &str,
        access_key_id: &str,
    ) -> Result<(), ApiError> {
        self.iam
            .delete_access_key()
            .user_name(user_name)
            .access_key_id(access_key_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ApiError::call("DeleteAccessKey", e))
    }

    async fn delete_role(&self, name: &str) -> Result<(), ApiError> {
        self.iam
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ApiError::call("DeleteRole", e))
    }

    async fn delete_user(&self, name: &str) -> Result<(), ApiError> {
        self.iam
            .delete_user()
            .user_name(name)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ApiError::call("DeleteUser", e))
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration_secs: i32,
    ) -> Result<TemporaryCredentialSet, ApiError> {
        let out = self
            .sts
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .duration_seconds(duration_secs)
            .send()
            .await
            .map_err(|e| ApiError::call("AssumeRole", e))?;
        let credentials = out
            .credentials()
            .ok_or_else(|| ApiError::call("AssumeRole", "response missing Credentials"))?;
        Ok(TemporaryCredentialSet {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
        })
    }

    async fn describe_organization(&self) -> Result<OrganizationInfo, ApiError> {
        let response = self.organizations.describe_organization().send().await;
        match response {
            Ok(out) => {
                let management = out
                    .organization()
                    .and_then(|org| org.master_account_id())
                    .ok_or_else(|| {
                        ApiError::call("DescribeOrganization", "response missing management account")
                    })?;
                let management_account_id = AccountId::parse(management)
                    .map_err(|e| ApiError::call("DescribeOrganization", e))?;
                Ok(OrganizationInfo {
                    management_account_id,
                })
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_access_denied_exception()
                    || service_err.is_aws_organizations_not_in_use_exception()
                {
                    Err(ApiError::NotAuthorized(service_err.to_string()))
                } else {
                    Err(ApiError::call("DescribeOrganization", service_err))
                }
            }
        }
    }

    async fn list_organization_accounts(&self) -> Result<Vec<OrgAccount>, ApiError> {
        let mut accounts = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .organizations
                .list_accounts()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| ApiError::call("ListAccounts", e))?;
            accounts.extend(response.accounts().iter().filter_map(org_account));
            next_token = response.next_token().map(|t| t.to_string());
            if next_token.is_none() {
                break;
            }
        }

        Ok(accounts)
    }

    async fn list_accounts_for_parent(&self, parent_id: &str) -> Result<Vec<OrgAccount>, ApiError> {
        let mut accounts = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .organizations
                .list_accounts_for_parent()
                .parent_id(parent_id)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| ApiError::call("ListAccountsForParent", e))?;
            accounts.extend(response.accounts().iter().filter_map(org_account));
            next_token = response.next_token().map(|t| t.to_string());
            if next_token.is_none() {
                break;
            }
        }

        Ok(accounts)
    }
}

/// Builds scoped handles from a temporary credential triple. Each handle
/// gets its own SDK config; the base config is never mutated.
pub struct AwsScopedApiFactory {
    region: Option<String>,
}

impl AwsScopedApiFactory {
    pub fn new(region: Option<String>) -> Self {
        Self { region }
    }
}

#[async_trait]
impl ScopedApiFactory for AwsScopedApiFactory {
    async fn scoped(&self, credentials: &TemporaryCredentialSet) -> Arc<dyn CloudIdentityApi> {
        let credentials = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
            None,
            SCOPED_PROVIDER_NAME,
        );
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).credentials_provider(credentials);
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let config = loader.load().await;
        Arc::new(AwsCloudIdentityApi::from_config(&config))
    }
}
