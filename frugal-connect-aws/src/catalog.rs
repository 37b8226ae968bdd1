//! Fixed policy catalog
//!
//! The desired-policy table, the custom least-privilege document, and the
//! ARN helpers shared by plan computation and apply. Plan and apply both
//! read from here; there is no other source of truth for what a fully
//! provisioned account looks like.

use crate::policy::{PolicyDocument, Statement};
use crate::types::AccountId;

/// One provider-curated policy the connector attaches to every principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedPolicySpec {
    pub arn: &'static str,
    pub description: &'static str,
}

/// Managed read-only policies attached identically to every principal in
/// every account. Never removed individually, only during full teardown.
pub const MANAGED_POLICIES: &[ManagedPolicySpec] = &[
    ManagedPolicySpec {
        arn: "arn:aws:iam::aws:policy/job-function/ViewOnlyAccess",
        description: "read-only view of resources and their metadata",
    },
    ManagedPolicySpec {
        arn: "arn:aws:iam::aws:policy/AWSBillingReadOnlyAccess",
        description: "read-only access to billing consoles and cost data",
    },
];

/// Name of the bespoke least-privilege policy created in every account.
pub const CUSTOM_POLICY_NAME: &str = "FrugalCostReadOnly";

/// Name of the inline policy on the primary principal that permits assuming
/// the connector role in member accounts.
pub const INLINE_ASSUME_POLICY_NAME: &str = "FrugalAssumeMemberRoles";

/// Default admin role assumed in member accounts to provision them. Created
/// automatically by Organizations in accounts that joined through it.
pub const DEFAULT_ADMIN_ROLE: &str = "OrganizationAccountAccessRole";

/// Session duration for every assumed role.
pub const SESSION_DURATION_SECS: i32 = 3600;

/// Base URL of the Frugal control-plane API, recorded in the credentials
/// artifact for the consuming product.
pub const API_BASE_URL: &str = "https://api.frugal.io";

/// Base URL telemetry and billing exports are delivered to.
pub const INGEST_BASE_URL: &str = "https://ingest.frugal.io";

/// Tag attached to every principal the connector creates.
pub const MANAGED_TAG: (&str, &str) = ("frugal:managed", "true");

/// ARN of the per-account custom policy, derived from the account id and the
/// fixed name. Existence is probed against this ARN, never searched by
/// content.
pub fn custom_policy_arn(account_id: &AccountId) -> String {
    format!("arn:aws:iam::{account_id}:policy/{CUSTOM_POLICY_NAME}")
}

pub fn role_arn(account_id: &AccountId, role_name: &str) -> String {
    format!("arn:aws:iam::{account_id}:role/{role_name}")
}

/// The bespoke read-only grant: cost and billing data, organization
/// descriptions, and log filtering. Everything Frugal pulls that the managed
/// policies do not already cover.
pub fn custom_policy_document() -> PolicyDocument {
    PolicyDocument::new(vec![Statement::allow(
        CUSTOM_POLICY_NAME,
        vec![
            "budgets:Describe*".to_string(),
            "budgets:ViewBudget".to_string(),
            "ce:Describe*".to_string(),
            "ce:Get*".to_string(),
            "ce:List*".to_string(),
            "cloudwatch:GetMetricData".to_string(),
            "cloudwatch:ListMetrics".to_string(),
            "cur:DescribeReportDefinitions".to_string(),
            "logs:DescribeLogGroups".to_string(),
            "logs:FilterLogEvents".to_string(),
            "organizations:Describe*".to_string(),
            "organizations:ListAccounts".to_string(),
            "organizations:ListTagsForResource".to_string(),
            "pricing:GetProducts".to_string(),
        ],
        "*",
    )])
}

/// Inline document granting `sts:AssumeRole` on the connector role in any
/// account. The wildcard account segment is what lets the shared-name design
/// reach member accounts without a per-account lookup table.
pub fn assume_member_roles_document(principal_name: &str) -> PolicyDocument {
    PolicyDocument::new(vec![Statement::allow(
        INLINE_ASSUME_POLICY_NAME,
        vec!["sts:AssumeRole".to_string()],
        &format!("arn:aws:iam::*:role/{principal_name}"),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountId {
        AccountId::parse("123456789012").unwrap()
    }

    #[test]
    fn test_custom_policy_arn_shape() {
        assert_eq!(
            custom_policy_arn(&account()),
            "arn:aws:iam::123456789012:policy/FrugalCostReadOnly"
        );
    }

    #[test]
    fn test_custom_policy_document_is_read_only() {
        let doc = custom_policy_document();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("ce:Get*"));
        assert!(json.contains("logs:FilterLogEvents"));
        assert!(json.contains("organizations:Describe*"));
        // No mutating verbs anywhere in the grant.
        for verb in ["Create", "Put", "Delete", "Update", "Attach"] {
            assert!(!json.contains(&format!(":{verb}")), "found {verb} in {json}");
        }
    }

    #[test]
    fn test_assume_member_roles_document_uses_wildcard_account() {
        let doc = assume_member_roles_document("FrugalReadOnly");
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"Resource\":\"arn:aws:iam::*:role/FrugalReadOnly\""));
        assert!(json.contains("\"Action\":\"sts:AssumeRole\""));
    }

    #[test]
    fn test_role_arn_shape() {
        assert_eq!(
            role_arn(&account(), "OrganizationAccountAccessRole"),
            "arn:aws:iam::123456789012:role/OrganizationAccountAccessRole"
        );
    }
}
