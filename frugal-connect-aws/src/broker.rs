//! Cross-account credential broker
//!
//! Every operation against a non-primary account goes through
//! [`CredentialBroker::with_assumed_role`]: assume the admin role in the
//! target account, run the body against a handle scoped to the temporary
//! credential triple, and return. The base handle's credentials are never
//! installed anywhere mutable, so there is nothing to restore and nothing
//! that can leak across account boundaries.

use crate::api::{CloudIdentityApi, ScopedApiFactory};
use crate::catalog::{role_arn, SESSION_DURATION_SECS};
use crate::error::AssumeRoleError;
use crate::types::AccountId;
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct CredentialBroker {
    api: Arc<dyn CloudIdentityApi>,
    factory: Arc<dyn ScopedApiFactory>,
}

impl CredentialBroker {
    pub fn new(api: Arc<dyn CloudIdentityApi>, factory: Arc<dyn ScopedApiFactory>) -> Self {
        Self { api, factory }
    }

    /// Assume `role_name` in `account_id` and run `body` with an API handle
    /// bound to the resulting session. A rejected assumption returns an
    /// [`AssumeRoleError`] carrying the attempted role ARN and the caller
    /// identity, so a missing trust relationship is diagnosable from the
    /// error alone; callers skip the account and continue the batch.
    pub async fn with_assumed_role<T, F, Fut>(
        &self,
        account_id: &AccountId,
        role_name: &str,
        body: F,
    ) -> Result<T, AssumeRoleError>
    where
        F: FnOnce(Arc<dyn CloudIdentityApi>) -> Fut,
        Fut: Future<Output = T>,
    {
        let target_arn = role_arn(account_id, role_name);
        let session_name = unique_session_name();

        let credentials = match self
            .api
            .assume_role(&target_arn, &session_name, SESSION_DURATION_SECS)
            .await
        {
            Ok(credentials) => credentials,
            Err(err) => {
                // Fetched lazily: the caller ARN is only needed for the
                // diagnostic, not on the happy path.
                let caller_arn = match self.api.caller_identity().await {
                    Ok(identity) => identity.arn,
                    Err(_) => "<unknown caller>".to_string(),
                };
                return Err(AssumeRoleError {
                    role_arn: target_arn,
                    caller_arn,
                    message: err.to_string(),
                });
            }
        };

        let scoped = self.factory.scoped(&credentials).await;
        Ok(body(scoped).await)
    }
}

/// Session names must be unique per assumption; a timestamp plus a process
/// counter keeps them distinguishable in CloudTrail.
fn unique_session_name() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let sequence = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("frugal-connect-{}-{sequence}", Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeCloud, FakeCloudState, FakeFactory};
    use crate::policy::PolicyDocument;

    fn account(id: &str) -> AccountId {
        AccountId::parse(id).unwrap()
    }

    fn broker(state: &Arc<std::sync::Mutex<FakeCloudState>>) -> CredentialBroker {
        let base = FakeCloud::handle(
            state.clone(),
            account("123456789012"),
            "arn:aws:iam::123456789012:user/setup",
        );
        CredentialBroker::new(base, FakeFactory::new(state.clone()))
    }

    #[tokio::test]
    async fn test_body_runs_against_target_account() {
        let state = FakeCloudState::shared();
        let broker = broker(&state);
        let member = account("210987654321");

        let result = broker
            .with_assumed_role(&member, "OrganizationAccountAccessRole", |api| async move {
                api.create_role("FrugalReadOnly", &PolicyDocument::new(vec![]), &[])
                    .await
            })
            .await
            .unwrap();
        assert!(result.is_ok());

        // The role landed in the member account, not the caller's.
        let state = state.lock().unwrap();
        assert!(state.accounts[&member].roles.contains_key("FrugalReadOnly"));
        assert!(!state.accounts[&account("123456789012")]
            .roles
            .contains_key("FrugalReadOnly"));
    }

    #[tokio::test]
    async fn test_rejected_assumption_reports_both_arns() {
        let state = FakeCloudState::shared();
        state.lock().unwrap().deny_assume.insert(
            "arn:aws:iam::210987654321:role/OrganizationAccountAccessRole".to_string(),
        );
        let broker = broker(&state);

        let err = broker
            .with_assumed_role(
                &account("210987654321"),
                "OrganizationAccountAccessRole",
                |_api| async move { () },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.role_arn,
            "arn:aws:iam::210987654321:role/OrganizationAccountAccessRole"
        );
        assert_eq!(err.caller_arn, "arn:aws:iam::123456789012:user/setup");
    }

    #[tokio::test]
    async fn test_base_credentials_unchanged_after_scope() {
        let state = FakeCloudState::shared();
        let base = FakeCloud::handle(
            state.clone(),
            account("123456789012"),
            "arn:aws:iam::123456789012:user/setup",
        );
        let broker = CredentialBroker::new(base.clone(), FakeFactory::new(state.clone()));

        let before = base.caller_identity().await.unwrap();
        broker
            .with_assumed_role(
                &account("210987654321"),
                "OrganizationAccountAccessRole",
                |api| async move {
                    let _ = api.create_user("frugal-reader", &[]).await;
                },
            )
            .await
            .unwrap();
        let after = base.caller_identity().await.unwrap();
        assert_eq!(before, after);

        // The base handle issued the AssumeRole call; every mutation went
        // through the scoped handle bound to the member account.
        let state = state.lock().unwrap();
        assert!(state
            .calls
            .iter()
            .any(|call| call.starts_with("123456789012/AssumeRole")));
        assert!(state
            .calls
            .iter()
            .any(|call| call.starts_with("210987654321/CreateUser")));
        assert!(!state
            .calls
            .iter()
            .any(|call| call.starts_with("123456789012/CreateUser")));
    }

    #[test]
    fn test_session_names_are_unique() {
        let a = unique_session_name();
        let b = unique_session_name();
        assert_ne!(a, b);
        assert!(a.starts_with("frugal-connect-"));
    }
}
