//! Trust-policy construction
//!
//! Exactly one trust shape applies per (account role, mode) combination:
//!
//! | account    | mode     | trust                                        |
//! |------------|----------|----------------------------------------------|
//! | primary    | WIF      | federated OIDC with subject/audience conds   |
//! | additional | WIF      | role-to-role from the primary account        |
//! | additional | IAM user | user-to-role from the primary account        |
//! | primary    | IAM user | none (a user principal has no trust policy)  |

use crate::policy::{ConditionBlock, PolicyDocument, PrincipalClause, Statement};
use crate::types::{AccountId, AccountRole, Mode};
use std::collections::BTreeMap;

/// OIDC provider for Google service account federation.
pub const GOOGLE_OIDC_PROVIDER: &str = "accounts.google.com";

/// Which principal is allowed to assume a provisioned role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPolicyKind {
    /// A federated Google identity, constrained to one service account's
    /// numeric id via subject and audience conditions.
    FederatedOidc { subject_id: String, audience: String },
    /// The connector role in the primary account.
    AssumeFromRole {
        account_id: AccountId,
        role_name: String,
    },
    /// The connector user in the primary account.
    AssumeFromUser {
        account_id: AccountId,
        user_name: String,
    },
}

impl TrustPolicyKind {
    /// Select the trust shape for an account. `None` means the principal is
    /// a user and carries no trust policy. This table is the only place the
    /// selection branches.
    pub fn select(
        account_role: AccountRole,
        mode: &Mode,
        primary: &AccountId,
        principal_name: &str,
    ) -> Option<Self> {
        match (account_role, mode) {
            (AccountRole::Primary, Mode::Wif(wif)) => Some(Self::FederatedOidc {
                subject_id: wif.subject_id.clone(),
                audience: wif.subject_id.clone(),
            }),
            (AccountRole::Additional, Mode::Wif(_)) => Some(Self::AssumeFromRole {
                account_id: primary.clone(),
                role_name: principal_name.to_string(),
            }),
            (AccountRole::Additional, Mode::IamUser) => Some(Self::AssumeFromUser {
                account_id: primary.clone(),
                user_name: principal_name.to_string(),
            }),
            (AccountRole::Primary, Mode::IamUser) => None,
        }
    }

    /// Serialize this trust shape to a policy document.
    pub fn document(&self) -> PolicyDocument {
        let statement = match self {
            Self::FederatedOidc {
                subject_id,
                audience,
            } => {
                let mut conds = BTreeMap::new();
                conds.insert(
                    format!("{GOOGLE_OIDC_PROVIDER}:aud"),
                    audience.clone(),
                );
                conds.insert(format!("{GOOGLE_OIDC_PROVIDER}:sub"), subject_id.clone());
                Statement::trust(
                    PrincipalClause::Federated(GOOGLE_OIDC_PROVIDER.to_string()),
                    "sts:AssumeRoleWithWebIdentity",
                    Some(ConditionBlock {
                        string_equals: conds,
                    }),
                )
            }
            Self::AssumeFromRole {
                account_id,
                role_name,
            } => Statement::trust(
                PrincipalClause::Aws(format!("arn:aws:iam::{account_id}:role/{role_name}")),
                "sts:AssumeRole",
                None,
            ),
            Self::AssumeFromUser {
                account_id,
                user_name,
            } => Statement::trust(
                PrincipalClause::Aws(format!("arn:aws:iam::{account_id}:user/{user_name}")),
                "sts:AssumeRole",
                None,
            ),
        };
        PolicyDocument::new(vec![statement])
    }
}
