//! In-memory cloud fake for tests
//!
//! Models a universe of accounts with roles, users, policies and an
//! optional organization, plus a call journal so tests can assert which
//! handle performed which operation.

use crate::api::{
    AccessKey, CallerIdentity, CloudIdentityApi, OrgAccount, OrganizationInfo, ScopedApiFactory,
};
use crate::error::ApiError;
use crate::policy::PolicyDocument;
use crate::types::{AccountId, PrincipalKind, TemporaryCredentialSet};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub(crate) struct FakeRole {
    pub trust: Option<PolicyDocument>,
    pub attached: Vec<String>,
    pub inline: BTreeMap<String, PolicyDocument>,
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeUser {
    pub attached: Vec<String>,
    pub inline: BTreeMap<String, PolicyDocument>,
    pub access_keys: Vec<String>,
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeAccount {
    pub roles: BTreeMap<String, FakeRole>,
    pub users: BTreeMap<String, FakeUser>,
    /// Customer-managed policies by ARN
    pub policies: BTreeMap<String, PolicyDocument>,
}

#[derive(Debug)]
pub(crate) struct FakeOrg {
    pub management_account_id: AccountId,
    pub accounts: Vec<OrgAccount>,
    /// OU id -> member account ids
    pub parents: BTreeMap<String, Vec<AccountId>>,
    pub describe_authorized: bool,
    pub list_available: bool,
}

#[derive(Debug, Default)]
pub(crate) struct FakeCloudState {
    pub accounts: BTreeMap<AccountId, FakeAccount>,
    pub org: Option<FakeOrg>,
    /// Role ARNs whose assumption is rejected (missing trust relationship)
    pub deny_assume: BTreeSet<String>,
    /// Journal of `<handle-account>/<operation>(<detail>)` entries
    pub calls: Vec<String>,
    key_counter: u64,
}

impl FakeCloudState {
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn ensure_account(&mut self, id: &AccountId) {
        self.accounts.entry(id.clone()).or_default();
    }

    pub fn calls_for(&self, operation: &str) -> Vec<String> {
        self.calls
            .iter()
            .filter(|call| call.contains(operation))
            .cloned()
            .collect()
    }
}

pub(crate) struct FakeCloud {
    state: Arc<Mutex<FakeCloudState>>,
    account: AccountId,
    identity_arn: String,
}

impl FakeCloud {
    pub fn handle(
        state: Arc<Mutex<FakeCloudState>>,
        account: AccountId,
        identity_arn: &str,
    ) -> Arc<Self> {
        state.lock().unwrap().ensure_account(&account);
        Arc::new(Self {
            state,
            account,
            identity_arn: identity_arn.to_string(),
        })
    }

    fn record(&self, operation: &str, detail: &str) {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("{}/{operation}({detail})", self.account));
    }

    fn no_such_entity(operation: &'static str, name: &str) -> ApiError {
        ApiError::call(operation, format!("NoSuchEntity: {name}"))
    }
}

#[async_trait]
impl CloudIdentityApi for FakeCloud {
    async fn caller_identity(&self) -> Result<CallerIdentity, ApiError> {
        self.record("GetCallerIdentity", "");
        Ok(CallerIdentity {
            account_id: self.account.clone(),
            arn: self.identity_arn.clone(),
        })
    }

    async fn role_exists(&self, name: &str) -> Result<bool, ApiError> {
        self.record("GetRole", name);
        let state = self.state.lock().unwrap();
        Ok(state.accounts[&self.account].roles.contains_key(name))
    }

    async fn user_exists(&self, name: &str) -> Result<bool, ApiError> {
        self.record("GetUser", name);
        let state = self.state.lock().unwrap();
        Ok(state.accounts[&self.account].users.contains_key(name))
    }

    async fn create_role(
        &self,
        name: &str,
        trust_policy: &PolicyDocument,
        tags: &[(String, String)],
    ) -> Result<(), ApiError> {
        self.record("CreateRole", name);
        let mut state = self.state.lock().unwrap();
        let account = state.accounts.get_mut(&self.account).unwrap();
        if account.roles.contains_key(name) {
            return Err(ApiError::AlreadyExists(name.to_string()));
        }
        account.roles.insert(
            name.to_string(),
            FakeRole {
                trust: Some(trust_policy.clone()),
                tags: tags.to_vec(),
                ..FakeRole::default()
            },
        );
        Ok(())
    }

    async fn create_user(&self, name: &str, tags: &[(String, String)]) -> Result<(), ApiError> {
        self.record("CreateUser", name);
        let mut state = self.state.lock().unwrap();
        let account = state.accounts.get_mut(&self.account).unwrap();
        if account.users.contains_key(name) {
            return Err(ApiError::AlreadyExists(name.to_string()));
        }
        account.users.insert(
            name.to_string(),
            FakeUser {
                tags: tags.to_vec(),
                ..FakeUser::default()
            },
        );
        Ok(())
    }

    async fn attach_managed_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_arn: &str,
    ) -> Result<(), ApiError> {
        self.record("AttachPolicy", &format!("{name}:{policy_arn}"));
        let mut state = self.state.lock().unwrap();
        let account = state.accounts.get_mut(&self.account).unwrap();
        let attached = match kind {
            PrincipalKind::Role => {
                &mut account
                    .roles
                    .get_mut(name)
                    .ok_or_else(|| Self::no_such_entity("AttachRolePolicy", name))?
                    .attached
            }
            PrincipalKind::User => {
                &mut account
                    .users
                    .get_mut(name)
                    .ok_or_else(|| Self::no_such_entity("AttachUserPolicy", name))?
                    .attached
            }
        };
        if !attached.contains(&policy_arn.to_string()) {
            attached.push(policy_arn.to_string());
        }
        Ok(())
    }

    async fn detach_managed_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_arn: &str,
    ) -> Result<(), ApiError> {
        self.record("DetachPolicy", &format!("{name}:{policy_arn}"));
        let mut state = self.state.lock().unwrap();
        let account = state.accounts.get_mut(&self.account).unwrap();
        let attached = match kind {
            PrincipalKind::Role => {
                &mut account
                    .roles
                    .get_mut(name)
                    .ok_or_else(|| Self::no_such_entity("DetachRolePolicy", name))?
                    .attached
            }
            PrincipalKind::User => {
                &mut account
                    .users
                    .get_mut(name)
                    .ok_or_else(|| Self::no_such_entity("DetachUserPolicy", name))?
                    .attached
            }
        };
        let before = attached.len();
        attached.retain(|arn| arn != policy_arn);
        if attached.len() == before {
            return Err(Self::no_such_entity("DetachPolicy", policy_arn));
        }
        Ok(())
    }

    async fn list_attached_policies(
        &self,
        kind: PrincipalKind,
        name: &str,
    ) -> Result<Vec<String>, ApiError> {
        self.record("ListAttachedPolicies", name);
        let state = self.state.lock().unwrap();
        let account = &state.accounts[&self.account];
        match kind {
            PrincipalKind::Role => account
                .roles
                .get(name)
                .map(|role| role.attached.clone())
                .ok_or_else(|| Self::no_such_entity("ListAttachedRolePolicies", name)),
            PrincipalKind::User => account
                .users
                .get(name)
                .map(|user| user.attached.clone())
                .ok_or_else(|| Self::no_such_entity("ListAttachedUserPolicies", name)),
        }
    }

    async fn policy_exists(&self, policy_arn: &str) -> Result<bool, ApiError> {
        self.record("GetPolicy", policy_arn);
        let state = self.state.lock().unwrap();
        Ok(state.accounts[&self.account]
            .policies
            .contains_key(policy_arn))
    }

    async fn create_policy(
        &self,
        name: &str,
        document: &PolicyDocument,
        _description: &str,
    ) -> Result<String, ApiError> {
        self.record("CreatePolicy", name);
        let arn = format!("arn:aws:iam::{}:policy/{name}", self.account);
        let mut state = self.state.lock().unwrap();
        let account = state.accounts.get_mut(&self.account).unwrap();
        if account.policies.contains_key(&arn) {
            return Err(ApiError::AlreadyExists(name.to_string()));
        }
        account.policies.insert(arn.clone(), document.clone());
        Ok(arn)
    }

    async fn delete_policy(&self, policy_arn: &str) -> Result<(), ApiError> {
        self.record("DeletePolicy", policy_arn);
        let mut state = self.state.lock().unwrap();
        let account = state.accounts.get_mut(&self.account).unwrap();
        account
            .policies
            .remove(policy_arn)
            .map(|_| ())
            .ok_or_else(|| Self::no_such_entity("DeletePolicy", policy_arn))
    }

    async fn put_inline_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_name: &str,
        document: &PolicyDocument,
    ) -> Result<(), ApiError> {
        self.record("PutInlinePolicy", &format!("{name}:{policy_name}"));
        let mut state = self.state.lock().unwrap();
        let account = state.accounts.get_mut(&self.account).unwrap();
        let inline = match kind {
            PrincipalKind::Role => {
                &mut account
                    .roles
                    .get_mut(name)
                    .ok_or_else(|| Self::no_such_entity("PutRolePolicy", name))?
                    .inline
            }
            PrincipalKind::User => {
                &mut account
                    .users
                    .get_mut(name)
                    .ok_or_else(|| Self::no_such_entity("PutUserPolicy", name))?
                    .inline
            }
        };
        inline.insert(policy_name.to_string(), document.clone());
        Ok(())
    }

    async fn delete_inline_policy(
        &self,
        kind: PrincipalKind,
        name: &str,
        policy_name: &str,
    ) -> Result<(), ApiError> {
        self.record("DeleteInlinePolicy", &format!("{name}:{policy_name}"));
        let mut state = self.state.lock().unwrap();
        let account = state.accounts.get_mut(&self.account).unwrap();
        let inline = match kind {
            PrincipalKind::Role => {
                &mut account
                    .roles
                    .get_mut(name)
                    .ok_or_else(|| Self::no_such_entity("DeleteRolePolicy", name))?
                    .inline
            }
            PrincipalKind::User => {
                &mut account
                    .users
                    .get_mut(name)
                    .ok_or_else(|| Self::no_such_entity("DeleteUserPolicy", name))?
                    .inline
            }
        };
        inline
            .remove(policy_name)
            .map(|_| ())
            .ok_or_else(|| Self::no_such_entity("DeleteInlinePolicy", policy_name))
    }

    async fn create_access_key(&self, user_name: &str) -> Result<AccessKey, ApiError> {
        self.record("CreateAccessKey", user_name);
        let mut state = self.state.lock().unwrap();
        state.key_counter += 1;
        let key_id = format!("AKIAFAKE{:08}", state.key_counter);
        let account = state.accounts.get_mut(&self.account).unwrap();
        let user = account
            .users
            .get_mut(user_name)
            .ok_or_else(|| Self::no_such_entity("CreateAccessKey", user_name))?;
        if user.access_keys.len() >= 2 {
            return Err(ApiError::LimitExceeded(user_name.to_string()));
        }
        user.access_keys.push(key_id.clone());
        Ok(AccessKey {
            access_key_id: key_id,
            secret_access_key: "fake-secret-material".to_string(),
        })
    }

    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<String>, ApiError> {
        self.record("ListAccessKeys", user_name);
        let state = self.state.lock().unwrap();
        state.accounts[&self.account]
            .users
            .get(user_name)
            .map(|user| user.access_keys.clone())
            .ok_or_else(|| Self::no_such_entity("ListAccessKeys", user_name))
    }

    async fn delete_access_key(
        &self,
        user_name: &str,
        access_key_id: &str,
    ) -> Result<(), ApiError> {
        self.record("DeleteAccessKey", &format!("{user_name}:{access_key_id}"));
        let mut state = self.state.lock().unwrap();
        let account = state.accounts.get_mut(&self.account).unwrap();
        let user = account
            .users
            .get_mut(user_name)
            .ok_or_else(|| Self::no_such_entity("DeleteAccessKey", user_name))?;
        let before = user.access_keys.len();
        user.access_keys.retain(|id| id != access_key_id);
        if user.access_keys.len() == before {
            return Err(Self::no_such_entity("DeleteAccessKey", access_key_id));
        }
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> Result<(), ApiError> {
        self.record("DeleteRole", name);
        let mut state = self.state.lock().unwrap();
        let account = state.accounts.get_mut(&self.account).unwrap();
        let role = account
            .roles
            .get(name)
            .ok_or_else(|| Self::no_such_entity("DeleteRole", name))?;
        if !role.attached.is_empty() || !role.inline.is_empty() {
            return Err(ApiError::call(
                "DeleteRole",
                "DeleteConflict: must detach all policies first",
            ));
        }
        account.roles.remove(name);
        Ok(())
    }

    async fn delete_user(&self, name: &str) -> Result<(), ApiError> {
        self.record("DeleteUser", name);
        let mut state = self.state.lock().unwrap();
        let account = state.accounts.get_mut(&self.account).unwrap();
        let user = account
            .users
            .get(name)
            .ok_or_else(|| Self::no_such_entity("DeleteUser", name))?;
        if !user.attached.is_empty() || !user.inline.is_empty() || !user.access_keys.is_empty() {
            return Err(ApiError::call(
                "DeleteUser",
                "DeleteConflict: must remove keys and policies first",
            ));
        }
        account.users.remove(name);
        Ok(())
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        _duration_secs: i32,
    ) -> Result<TemporaryCredentialSet, ApiError> {
        self.record("AssumeRole", &format!("{role_arn}:{session_name}"));
        let state = self.state.lock().unwrap();
        if state.deny_assume.contains(role_arn) {
            return Err(ApiError::NotAuthorized(format!(
                "AccessDenied assuming {role_arn}"
            )));
        }
        // arn:aws:iam::{account}:role/{name}
        let account = role_arn
            .split(':')
            .nth(4)
            .ok_or_else(|| ApiError::call("AssumeRole", "malformed role ARN"))?;
        let role = role_arn.rsplit('/').next().unwrap_or_default();
        Ok(TemporaryCredentialSet {
            access_key_id: "ASIAFAKE00000001".to_string(),
            secret_access_key: "fake-session-secret".to_string(),
            session_token: format!("scope:{account}:{role}"),
        })
    }

    async fn describe_organization(&self) -> Result<OrganizationInfo, ApiError> {
        self.record("DescribeOrganization", "");
        let state = self.state.lock().unwrap();
        match &state.org {
            Some(org) if org.describe_authorized => Ok(OrganizationInfo {
                management_account_id: org.management_account_id.clone(),
            }),
            _ => Err(ApiError::NotAuthorized(
                "AccessDeniedException: DescribeOrganization".to_string(),
            )),
        }
    }

    async fn list_organization_accounts(&self) -> Result<Vec<OrgAccount>, ApiError> {
        self.record("ListAccounts", "");
        let state = self.state.lock().unwrap();
        match &state.org {
            Some(org) if org.list_available => Ok(org.accounts.clone()),
            _ => Err(ApiError::call("ListAccounts", "organizations unreachable")),
        }
    }

    async fn list_accounts_for_parent(&self, parent_id: &str) -> Result<Vec<OrgAccount>, ApiError> {
        self.record("ListAccountsForParent", parent_id);
        let state = self.state.lock().unwrap();
        match &state.org {
            Some(org) if org.list_available => {
                let members = org.parents.get(parent_id).cloned().unwrap_or_default();
                Ok(org
                    .accounts
                    .iter()
                    .filter(|account| members.contains(&account.id))
                    .cloned()
                    .collect())
            }
            _ => Err(ApiError::call(
                "ListAccountsForParent",
                "organizations unreachable",
            )),
        }
    }
}

/// Factory handing out handles scoped to the account encoded in the fake
/// session token.
pub(crate) struct FakeFactory {
    state: Arc<Mutex<FakeCloudState>>,
}

impl FakeFactory {
    pub fn new(state: Arc<Mutex<FakeCloudState>>) -> Arc<Self> {
        Arc::new(Self { state })
    }
}

#[async_trait]
impl ScopedApiFactory for FakeFactory {
    async fn scoped(&self, credentials: &TemporaryCredentialSet) -> Arc<dyn CloudIdentityApi> {
        let mut parts = credentials.session_token.splitn(3, ':');
        let _tag = parts.next();
        let account = parts.next().unwrap_or_default();
        let role = parts.next().unwrap_or_default();
        let account = AccountId::parse(account).expect("fake session token carries an account id");
        let arn = format!("arn:aws:sts::{account}:assumed-role/{role}/fake-session");
        let handle: Arc<dyn CloudIdentityApi> = FakeCloud::handle(self.state.clone(), account, &arn);
        handle
    }
}

/// Convenience test fixtures.
pub(crate) fn org_account(id: &str, name: &str, status: &str) -> OrgAccount {
    OrgAccount {
        id: AccountId::parse(id).unwrap(),
        name: name.to_string(),
        status: status.to_string(),
    }
}
