//! Provision and teardown orchestration
//!
//! Linear flow, no loops back: the primary account first, with failures
//! propagating, then each additional account sequentially under a freshly
//! assumed admin role, with failures bucketed so one broken trust
//! relationship never blocks the rest of the batch.

use crate::api::{AccessKey, CloudIdentityApi, ScopedApiFactory};
use crate::broker::CredentialBroker;
use crate::catalog::INLINE_ASSUME_POLICY_NAME;
use crate::discovery;
use crate::error::{ApiError, AssumeRoleError, ConnectError, ProvisionError, TeardownError};
use crate::identity::{AdditionalAccounts, ResolvedTarget};
use crate::provision::{AttachmentOutcome, Provisioner};
use crate::trust::TrustPolicyKind;
use crate::types::{AccountId, AccountRef, AccountRole, Mode, PrincipalKind, PrincipalRef};
use log::{info, warn};
use std::sync::Arc;

/// Per-account result of a provisioning run.
#[derive(Debug)]
pub enum AccountOutcome {
    Provisioned(AttachmentOutcome),
    /// The admin role in this account rejected the assumption; the account
    /// was skipped and the run continued.
    SkippedAssumeRole(AssumeRoleError),
    Failed(String),
}

/// Final report of a provisioning run, bucketed by outcome.
#[derive(Debug)]
pub struct RunSummary {
    pub outcomes: Vec<(AccountId, AccountOutcome)>,
    /// Access key material created for the user principal (IAM-user mode)
    pub access_key: Option<AccessKey>,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn provisioned(&self) -> Vec<&AccountId> {
        self.bucket(|outcome| matches!(outcome, AccountOutcome::Provisioned(_)))
    }

    pub fn skipped(&self) -> Vec<&AccountId> {
        self.bucket(|outcome| matches!(outcome, AccountOutcome::SkippedAssumeRole(_)))
    }

    pub fn failed(&self) -> Vec<&AccountId> {
        self.bucket(|outcome| matches!(outcome, AccountOutcome::Failed(_)))
    }

    fn bucket(&self, predicate: impl Fn(&AccountOutcome) -> bool) -> Vec<&AccountId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .map(|(id, _)| id)
            .collect()
    }
}

/// Per-account result of a teardown run.
#[derive(Debug)]
pub enum UndoOutcome {
    Cleaned,
    /// Some steps failed; everything else was still attempted.
    Partial(Vec<TeardownError>),
    SkippedAssumeRole(AssumeRoleError),
}

/// Final report of a teardown run.
#[derive(Debug)]
pub struct UndoSummary {
    pub outcomes: Vec<(AccountId, UndoOutcome)>,
}

/// Drives the run: account resolution, planning, provisioning, teardown.
pub struct Orchestrator {
    api: Arc<dyn CloudIdentityApi>,
    broker: CredentialBroker,
    provisioner: Provisioner,
}

impl Orchestrator {
    pub fn new(api: Arc<dyn CloudIdentityApi>, factory: Arc<dyn ScopedApiFactory>) -> Self {
        Self {
            broker: CredentialBroker::new(api.clone(), factory),
            api,
            provisioner: Provisioner::new(),
        }
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    /// Expand the target's account selection into the fixed account set for
    /// this run: the primary first, then the additional accounts, resolved
    /// from the explicit list or from organization discovery.
    pub async fn resolve_accounts(
        &self,
        target: &ResolvedTarget,
    ) -> Result<(Vec<AccountRef>, Vec<String>), ConnectError> {
        let mut warnings = Vec::new();
        let additional: Vec<AccountId> = match &target.additional {
            AdditionalAccounts::None => Vec::new(),
            AdditionalAccounts::Explicit(accounts) => accounts.clone(),
            AdditionalAccounts::OrgFilter(filter) => {
                let report =
                    discovery::discover(self.api.as_ref(), filter, &target.primary).await?;
                if let Some(warning) = report.management_warning {
                    warn!("{warning}");
                    warnings.push(warning);
                }
                info!(
                    "discovered {} additional account(s) from the organization",
                    report.accounts.len()
                );
                report.accounts
            }
        };

        let mut accounts = vec![AccountRef::primary(target.primary.clone())];
        accounts.extend(additional.into_iter().map(AccountRef::additional));
        Ok((accounts, warnings))
    }

    /// Compute the pre-confirmation plan. Read-only.
    pub async fn compute_plan(
        &self,
        target: &ResolvedTarget,
        accounts: &[AccountRef],
    ) -> Result<crate::plan::ProvisioningPlan, ConnectError> {
        crate::plan::ProvisioningPlan::compute(
            self.api.as_ref(),
            &self.broker,
            &self.provisioner,
            target,
            accounts,
        )
        .await
    }

    /// Provision every account in the run. A primary-account failure aborts
    /// (nothing downstream is valid without it); additional-account failures
    /// are bucketed and the loop continues.
    pub async fn provision(
        &self,
        target: &ResolvedTarget,
        accounts: &[AccountRef],
    ) -> Result<RunSummary, ConnectError> {
        let has_additional = accounts.iter().any(|account| !account.is_primary);
        let mut outcomes = Vec::with_capacity(accounts.len());

        let (primary_outcome, access_key) = self
            .provision_primary(target, has_additional)
            .await
            .map_err(ConnectError::Provision)?;
        outcomes.push((
            target.primary.clone(),
            AccountOutcome::Provisioned(primary_outcome),
        ));

        for account in accounts.iter().filter(|account| !account.is_primary) {
            let provisioner = &self.provisioner;
            let result = self
                .broker
                .with_assumed_role(&account.id, &target.admin_role, |scoped| async move {
                    provision_additional(scoped.as_ref(), provisioner, target, &account.id).await
                })
                .await;
            let outcome = match result {
                Ok(Ok(outcome)) => {
                    info!("provisioned account {}", account.id);
                    AccountOutcome::Provisioned(outcome)
                }
                Ok(Err(err)) => {
                    warn!("provisioning failed in account {}: {err}", account.id);
                    AccountOutcome::Failed(err.to_string())
                }
                Err(assume_err) => {
                    warn!("skipping account {}: {assume_err}", account.id);
                    AccountOutcome::SkippedAssumeRole(assume_err)
                }
            };
            outcomes.push((account.id.clone(), outcome));
        }

        Ok(RunSummary {
            outcomes,
            access_key,
            warnings: Vec::new(),
        })
    }

    async fn provision_primary(
        &self,
        target: &ResolvedTarget,
        has_additional: bool,
    ) -> Result<(AttachmentOutcome, Option<AccessKey>), ProvisionError> {
        let api = self.api.as_ref();

        // The selection table yields no trust shape exactly when the primary
        // principal is a user.
        let principal = match TrustPolicyKind::select(
            AccountRole::Primary,
            &target.mode,
            &target.primary,
            &target.principal_name,
        ) {
            Some(trust) => {
                self.provisioner
                    .ensure_role(api, &target.primary, &target.principal_name, &trust)
                    .await?
            }
            None => {
                self.provisioner
                    .ensure_user(api, &target.primary, &target.principal_name)
                    .await?
            }
        };

        self.provisioner
            .ensure_custom_policy(api, &target.primary)
            .await?;
        let outcome = self
            .provisioner
            .reconcile_attachments(api, &principal)
            .await?;

        if has_additional {
            self.provisioner
                .grant_member_role_access(api, &principal)
                .await?;
        }

        let access_key = match target.mode {
            Mode::IamUser => Some(
                self.provisioner
                    .create_access_key(api, &target.principal_name)
                    .await?,
            ),
            Mode::Wif(_) => None,
        };

        Ok((outcome, access_key))
    }

    /// Tear down every account in the run, then report. Best-effort: step
    /// failures are collected per account, never allowed to stop the rest.
    pub async fn undo(
        &self,
        target: &ResolvedTarget,
        accounts: &[AccountRef],
    ) -> Result<UndoSummary, ConnectError> {
        let mut outcomes = Vec::with_capacity(accounts.len());

        for account in accounts {
            let outcome = if account.is_primary {
                let failures =
                    teardown_account(self.api.as_ref(), &self.provisioner, target, account).await;
                undo_outcome(failures)
            } else {
                let provisioner = &self.provisioner;
                let result = self
                    .broker
                    .with_assumed_role(&account.id, &target.admin_role, |scoped| async move {
                        teardown_account(scoped.as_ref(), provisioner, target, account).await
                    })
                    .await;
                match result {
                    Ok(failures) => undo_outcome(failures),
                    Err(assume_err) => {
                        warn!("skipping teardown of {}: {assume_err}", account.id);
                        UndoOutcome::SkippedAssumeRole(assume_err)
                    }
                }
            };
            outcomes.push((account.id.clone(), outcome));
        }

        Ok(UndoSummary { outcomes })
    }
}

fn undo_outcome(failures: Vec<TeardownError>) -> UndoOutcome {
    if failures.is_empty() {
        UndoOutcome::Cleaned
    } else {
        UndoOutcome::Partial(failures)
    }
}

async fn provision_additional(
    api: &dyn CloudIdentityApi,
    provisioner: &Provisioner,
    target: &ResolvedTarget,
    account_id: &AccountId,
) -> Result<AttachmentOutcome, ProvisionError> {
    // Additional accounts always chain to the primary, so the selection
    // table always yields a trust shape here.
    let Some(trust) = TrustPolicyKind::select(
        AccountRole::Additional,
        &target.mode,
        &target.primary,
        &target.principal_name,
    ) else {
        return Err(ProvisionError::Api(ApiError::call(
            "TrustPolicySelection",
            "no trust shape for an additional account",
        )));
    };

    let principal = provisioner
        .ensure_role(api, account_id, &target.principal_name, &trust)
        .await?;
    provisioner.ensure_custom_policy(api, account_id).await?;
    provisioner.reconcile_attachments(api, &principal).await
}

/// Remove everything provisioning created in one account, in dependency
/// order: detach policies, delete the inline grant and any access keys,
/// then the principal, then the custom policy.
async fn teardown_account(
    api: &dyn CloudIdentityApi,
    provisioner: &Provisioner,
    target: &ResolvedTarget,
    account: &AccountRef,
) -> Vec<TeardownError> {
    let mut failures = Vec::new();
    let account_role = if account.is_primary {
        AccountRole::Primary
    } else {
        AccountRole::Additional
    };
    let kind = target.mode.principal_kind_for(account_role);
    let name = &target.principal_name;
    let principal = PrincipalRef::new(kind, name, account.id.clone());

    let exists = match kind {
        PrincipalKind::Role => api.role_exists(name).await,
        PrincipalKind::User => api.user_exists(name).await,
    };
    match exists {
        Ok(true) => {
            detach_policies(api, provisioner, &principal, &mut failures).await;

            if account.is_primary {
                // Present only after a multi-account run; absence is normal.
                if let Err(err) = api
                    .delete_inline_policy(kind, name, INLINE_ASSUME_POLICY_NAME)
                    .await
                {
                    log::debug!("no inline assume grant to remove: {err}");
                }
            }

            if kind == PrincipalKind::User {
                delete_access_keys(api, name, &account.id, &mut failures).await;
            }

            let deletion = match kind {
                PrincipalKind::Role => api.delete_role(name).await,
                PrincipalKind::User => api.delete_user(name).await,
            };
            match deletion {
                Ok(()) => info!("deleted {kind} {name} in {}", account.id),
                Err(err) => failures.push(step_failure("DeletePrincipal", &account.id, err)),
            }
        }
        Ok(false) => info!("no {kind} {name} in {}, nothing to remove", account.id),
        Err(err) => failures.push(step_failure("ProbePrincipal", &account.id, err)),
    }

    let custom_arn = crate::catalog::custom_policy_arn(&account.id);
    match api.policy_exists(&custom_arn).await {
        Ok(true) => {
            if let Err(err) = api.delete_policy(&custom_arn).await {
                failures.push(step_failure("DeletePolicy", &account.id, err));
            }
        }
        Ok(false) => {}
        Err(err) => failures.push(step_failure("ProbePolicy", &account.id, err)),
    }

    failures
}

async fn detach_policies(
    api: &dyn CloudIdentityApi,
    provisioner: &Provisioner,
    principal: &PrincipalRef,
    failures: &mut Vec<TeardownError>,
) {
    let attached = match api
        .list_attached_policies(principal.kind, &principal.name)
        .await
    {
        Ok(attached) => attached,
        Err(err) => {
            failures.push(step_failure(
                "ListAttachedPolicies",
                &principal.account_id,
                err,
            ));
            return;
        }
    };
    for (arn, _) in provisioner.desired_for(&principal.account_id) {
        if attached.contains(&arn) {
            if let Err(err) = api
                .detach_managed_policy(principal.kind, &principal.name, &arn)
                .await
            {
                failures.push(step_failure("DetachPolicy", &principal.account_id, err));
            }
        }
    }
}

async fn delete_access_keys(
    api: &dyn CloudIdentityApi,
    user_name: &str,
    account_id: &AccountId,
    failures: &mut Vec<TeardownError>,
) {
    match api.list_access_keys(user_name).await {
        Ok(key_ids) => {
            for key_id in key_ids {
                if let Err(err) = api.delete_access_key(user_name, &key_id).await {
                    failures.push(step_failure("DeleteAccessKey", account_id, err));
                }
            }
        }
        Err(err) => failures.push(step_failure("ListAccessKeys", account_id, err)),
    }
}

fn step_failure(step: &str, account_id: &AccountId, err: ApiError) -> TeardownError {
    TeardownError {
        step: step.to_string(),
        account_id: account_id.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CUSTOM_POLICY_NAME;
    use crate::fake::{org_account, FakeCloud, FakeCloudState, FakeFactory, FakeOrg};
    use crate::identity::{resolve, SetupRequest};
    use crate::plan::PolicyStatus;
    use crate::policy::StringOrList;
    use std::sync::Mutex;

    const PRIMARY: &str = "123456789012";
    const MEMBER: &str = "210987654321";

    fn account(id: &str) -> AccountId {
        AccountId::parse(id).unwrap()
    }

    fn request(wif: bool, additional: Option<&str>) -> SetupRequest {
        SetupRequest {
            principal_name: "FrugalReadOnly".to_string(),
            primary_account: PRIMARY.to_string(),
            wif: wif.then(|| "sa@proj.iam.gserviceaccount.com:999111222".to_string()),
            additional_accounts: additional.map(str::to_string),
            org_accounts: None,
            admin_role: "OrganizationAccountAccessRole".to_string(),
        }
    }

    fn fixture() -> (Arc<Mutex<FakeCloudState>>, Orchestrator) {
        let state = FakeCloudState::shared();
        let api = FakeCloud::handle(
            state.clone(),
            account(PRIMARY),
            "arn:aws:iam::123456789012:user/setup",
        );
        let orchestrator = Orchestrator::new(api, FakeFactory::new(state.clone()));
        (state, orchestrator)
    }

    #[tokio::test]
    async fn test_wif_multi_account_happy_path() {
        let (state, orchestrator) = fixture();
        let target = resolve(&request(true, Some(MEMBER))).unwrap();
        let (accounts, _) = orchestrator.resolve_accounts(&target).await.unwrap();

        let summary = orchestrator.provision(&target, &accounts).await.unwrap();
        assert_eq!(summary.provisioned().len(), 2);
        assert!(summary.skipped().is_empty());
        assert!(summary.failed().is_empty());
        assert!(summary.access_key.is_none());

        let state = state.lock().unwrap();

        // Primary role trusts the OIDC provider.
        let primary_role = &state.accounts[&account(PRIMARY)].roles["FrugalReadOnly"];
        let trust = serde_json::to_string(primary_role.trust.as_ref().unwrap()).unwrap();
        assert!(trust.contains("\"Federated\":\"accounts.google.com\""));
        assert!(!trust.contains("\"AWS\""));

        // Member role trusts the primary role by ARN, never the provider.
        let member_role = &state.accounts[&account(MEMBER)].roles["FrugalReadOnly"];
        let trust = serde_json::to_string(member_role.trust.as_ref().unwrap()).unwrap();
        assert!(trust.contains("\"AWS\":\"arn:aws:iam::123456789012:role/FrugalReadOnly\""));
        assert!(!trust.contains("Federated"));

        // Both roles carry the managed policies plus the per-account custom
        // policy; the primary also carries the inline assume grant.
        for (id, role) in [
            (account(PRIMARY), primary_role),
            (account(MEMBER), member_role),
        ] {
            assert_eq!(
                role.attached.len(),
                crate::catalog::MANAGED_POLICIES.len() + 1,
                "attachment count in {id}"
            );
            assert!(role
                .attached
                .contains(&format!("arn:aws:iam::{id}:policy/{CUSTOM_POLICY_NAME}")));
        }
        assert!(primary_role.inline.contains_key(INLINE_ASSUME_POLICY_NAME));
        assert!(member_role.inline.is_empty());
    }

    #[tokio::test]
    async fn test_denied_member_is_skipped_not_fatal() {
        let (state, orchestrator) = fixture();
        state
            .lock()
            .unwrap()
            .deny_assume
            .insert(format!("arn:aws:iam::{MEMBER}:role/OrganizationAccountAccessRole"));
        let target = resolve(&request(true, Some(MEMBER))).unwrap();
        let (accounts, _) = orchestrator.resolve_accounts(&target).await.unwrap();

        let summary = orchestrator.provision(&target, &accounts).await.unwrap();
        assert_eq!(summary.provisioned(), vec![&account(PRIMARY)]);
        assert_eq!(summary.skipped(), vec![&account(MEMBER)]);

        // The primary account is still fully provisioned.
        let state = state.lock().unwrap();
        assert!(state.accounts[&account(PRIMARY)]
            .roles
            .contains_key("FrugalReadOnly"));
        assert!(!state.accounts[&account(MEMBER)]
            .roles
            .contains_key("FrugalReadOnly"));
    }

    #[tokio::test]
    async fn test_provisioning_is_idempotent() {
        let (_state, orchestrator) = fixture();
        let target = resolve(&request(true, Some(MEMBER))).unwrap();
        let (accounts, _) = orchestrator.resolve_accounts(&target).await.unwrap();

        orchestrator.provision(&target, &accounts).await.unwrap();
        let second = orchestrator.provision(&target, &accounts).await.unwrap();

        let desired = orchestrator.provisioner().desired_for(&target.primary).len();
        for (id, outcome) in &second.outcomes {
            match outcome {
                AccountOutcome::Provisioned(counts) => {
                    assert_eq!(counts.added, 0, "second run added in {id}");
                    assert_eq!(counts.skipped, desired, "second run skip count in {id}");
                }
                other => panic!("expected Provisioned for {id}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_plan_and_apply_agree() {
        let (state, orchestrator) = fixture();
        let target = resolve(&request(true, Some(MEMBER))).unwrap();
        let (accounts, _) = orchestrator.resolve_accounts(&target).await.unwrap();

        let plan = orchestrator.compute_plan(&target, &accounts).await.unwrap();
        orchestrator.provision(&target, &accounts).await.unwrap();

        let state = state.lock().unwrap();
        for account_plan in &plan.accounts {
            let attached = &state.accounts[&account_plan.account.id].roles["FrugalReadOnly"].attached;
            for entry in &account_plan.entries {
                assert_eq!(
                    entry.status,
                    PolicyStatus::WillAttach,
                    "fresh account should predict attach for {}",
                    entry.policy_arn
                );
                assert!(
                    attached.contains(&entry.policy_arn),
                    "{} predicted but not attached",
                    entry.policy_arn
                );
            }
            // Nothing attached beyond what the plan predicted.
            assert_eq!(attached.len(), account_plan.entries.len());
        }
    }

    #[tokio::test]
    async fn test_undo_reverses_everything() {
        let (state, orchestrator) = fixture();
        let target = resolve(&request(true, Some(MEMBER))).unwrap();
        let (accounts, _) = orchestrator.resolve_accounts(&target).await.unwrap();

        orchestrator.provision(&target, &accounts).await.unwrap();
        let summary = orchestrator.undo(&target, &accounts).await.unwrap();

        for (id, outcome) in &summary.outcomes {
            assert!(
                matches!(outcome, UndoOutcome::Cleaned),
                "expected clean teardown for {id}, got {outcome:?}"
            );
        }

        let state = state.lock().unwrap();
        for id in [account(PRIMARY), account(MEMBER)] {
            let cloud_account = &state.accounts[&id];
            assert!(cloud_account.roles.is_empty(), "roles left in {id}");
            assert!(cloud_account.users.is_empty(), "users left in {id}");
            assert!(cloud_account.policies.is_empty(), "policies left in {id}");
        }
    }

    #[tokio::test]
    async fn test_iam_user_mode_end_to_end() {
        let (state, orchestrator) = fixture();
        let target = resolve(&request(false, Some(MEMBER))).unwrap();
        let (accounts, _) = orchestrator.resolve_accounts(&target).await.unwrap();

        let summary = orchestrator.provision(&target, &accounts).await.unwrap();
        let key = summary.access_key.as_ref().expect("user mode yields a key");
        assert!(key.access_key_id.starts_with("AKIA"));

        {
            let state = state.lock().unwrap();
            let user = &state.accounts[&account(PRIMARY)].users["FrugalReadOnly"];
            assert_eq!(user.access_keys.len(), 1);
            assert!(user.inline.contains_key(INLINE_ASSUME_POLICY_NAME));

            // The member account still gets a role, trusting the user.
            let member_role = &state.accounts[&account(MEMBER)].roles["FrugalReadOnly"];
            let trust = serde_json::to_string(member_role.trust.as_ref().unwrap()).unwrap();
            assert!(trust.contains("\"AWS\":\"arn:aws:iam::123456789012:user/FrugalReadOnly\""));
        }

        // Undo removes the keys along with everything else.
        orchestrator.undo(&target, &accounts).await.unwrap();
        let state = state.lock().unwrap();
        assert!(state.accounts[&account(PRIMARY)].users.is_empty());
        assert!(state.accounts[&account(MEMBER)].roles.is_empty());
    }

    #[tokio::test]
    async fn test_primary_failure_aborts_run() {
        let (state, orchestrator) = fixture();
        let target = resolve(&request(false, Some(MEMBER))).unwrap();
        let (accounts, _) = orchestrator.resolve_accounts(&target).await.unwrap();

        // Pre-create the user with a full key quota; the primary access-key
        // step then fails and the member account must never be touched.
        {
            let mut state = state.lock().unwrap();
            state.ensure_account(&account(PRIMARY));
            let cloud_account = state.accounts.get_mut(&account(PRIMARY)).unwrap();
            cloud_account.users.insert(
                "FrugalReadOnly".to_string(),
                crate::fake::FakeUser {
                    access_keys: vec!["AKIAOLD00000001".to_string(), "AKIAOLD00000002".to_string()],
                    ..Default::default()
                },
            );
        }

        let err = orchestrator.provision(&target, &accounts).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectError::Provision(ProvisionError::AccessKeyLimit { .. })
        ));

        let state = state.lock().unwrap();
        assert!(!state.accounts[&account(MEMBER)]
            .roles
            .contains_key("FrugalReadOnly"));
    }

    #[tokio::test]
    async fn test_single_account_run_gets_no_inline_grant() {
        let (state, orchestrator) = fixture();
        let target = resolve(&request(true, None)).unwrap();
        let (accounts, _) = orchestrator.resolve_accounts(&target).await.unwrap();
        assert_eq!(accounts.len(), 1);

        orchestrator.provision(&target, &accounts).await.unwrap();
        let state = state.lock().unwrap();
        let role = &state.accounts[&account(PRIMARY)].roles["FrugalReadOnly"];
        assert!(role.inline.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_accounts_via_org_discovery() {
        let (state, orchestrator) = fixture();
        state.lock().unwrap().org = Some(FakeOrg {
            management_account_id: account(PRIMARY),
            accounts: vec![
                org_account(PRIMARY, "management", "ACTIVE"),
                org_account(MEMBER, "prod-payments", "ACTIVE"),
                org_account("310987654321", "sandbox", "SUSPENDED"),
            ],
            parents: Default::default(),
            describe_authorized: true,
            list_available: true,
        });

        let mut request = request(true, None);
        request.org_accounts = Some("all".to_string());
        let target = resolve(&request).unwrap();

        let (accounts, warnings) = orchestrator.resolve_accounts(&target).await.unwrap();
        assert!(warnings.is_empty());
        // Primary plus the one active member; the suspended account and the
        // caller itself are excluded.
        assert_eq!(accounts.len(), 2);
        assert!(accounts[0].is_primary);
        assert_eq!(accounts[1].id, account(MEMBER));
    }

    #[tokio::test]
    async fn test_org_discovery_unreachable_is_fatal() {
        let (_state, orchestrator) = fixture();
        let mut request = request(true, None);
        request.org_accounts = Some("all".to_string());
        let target = resolve(&request).unwrap();

        let err = orchestrator.resolve_accounts(&target).await.unwrap_err();
        assert!(matches!(err, ConnectError::Discovery(_)));
    }

    #[tokio::test]
    async fn test_member_account_discovery_warns() {
        let (state, orchestrator) = fixture();
        state.lock().unwrap().org = Some(FakeOrg {
            management_account_id: account("999999999999"),
            accounts: vec![org_account(MEMBER, "prod", "ACTIVE")],
            parents: Default::default(),
            describe_authorized: true,
            list_available: true,
        });

        let mut request = request(true, None);
        request.org_accounts = Some("all".to_string());
        let target = resolve(&request).unwrap();

        let (accounts, warnings) = orchestrator.resolve_accounts(&target).await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("not the organization's management account"));
    }

    #[test]
    fn test_inline_grant_document_shape() {
        // The grant the orchestrator installs must target the shared name
        // with a wildcard account segment.
        let doc = crate::catalog::assume_member_roles_document("FrugalReadOnly");
        let statement = &doc.statement[0];
        assert_eq!(
            statement.resource,
            Some(StringOrList::Single(
                "arn:aws:iam::*:role/FrugalReadOnly".to_string()
            ))
        );
    }
}
