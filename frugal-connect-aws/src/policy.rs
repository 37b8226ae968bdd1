//! IAM policy document model
//!
//! Typed statement and document structures that serialize to the provider's
//! policy schema. Trust and permission documents are built through these
//! types only; no JSON string templating anywhere.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Policy language version understood by the provider.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Policy document structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: statements,
        }
    }
}

/// Policy statement structure. Trust statements carry a principal and no
/// resource; permission statements carry a resource and no principal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<PrincipalClause>,
    pub action: StringOrList,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<StringOrList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionBlock>,
}

impl Statement {
    /// Permission statement: Allow `actions` on `resource`, deduplicated and
    /// sorted for deterministic documents.
    pub fn allow(sid: &str, actions: Vec<String>, resource: &str) -> Self {
        let mut unique: Vec<String> = actions;
        unique.sort();
        unique.dedup();
        Self {
            sid: Some(sid.to_string()),
            effect: "Allow".to_string(),
            principal: None,
            action: StringOrList::from_vec(unique),
            resource: Some(StringOrList::Single(resource.to_string())),
            condition: None,
        }
    }

    /// Trust statement: Allow `principal` to call `action` on the role the
    /// document is attached to.
    pub fn trust(principal: PrincipalClause, action: &str, condition: Option<ConditionBlock>) -> Self {
        Self {
            sid: None,
            effect: "Allow".to_string(),
            principal: Some(principal),
            action: StringOrList::Single(action.to_string()),
            resource: None,
            condition,
        }
    }
}

/// A JSON value that is a bare string when single and a list otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StringOrList {
    Single(String),
    Multiple(Vec<String>),
}

impl StringOrList {
    pub fn from_vec(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Self::Single(values.remove(0))
        } else {
            Self::Multiple(values)
        }
    }
}

/// The principal a trust statement admits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PrincipalClause {
    /// A federated OIDC identity provider, e.g. `accounts.google.com`
    #[serde(rename = "Federated")]
    Federated(String),
    /// An account-to-account principal identified by ARN
    #[serde(rename = "AWS")]
    Aws(String),
}

/// `StringEquals` condition block of a trust statement. A sorted map keeps
/// serialized documents deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConditionBlock {
    #[serde(rename = "StringEquals")]
    pub string_equals: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_statement_serialization() {
        let stmt = Statement::allow(
            "FrugalCostReadOnly",
            vec!["ce:Get*".to_string(), "budgets:ViewBudget".to_string()],
            "*",
        );
        let json = serde_json::to_string(&stmt).unwrap();
        assert!(json.contains("\"Sid\":\"FrugalCostReadOnly\""));
        assert!(json.contains("\"Effect\":\"Allow\""));
        assert!(json.contains("\"Action\":[\"budgets:ViewBudget\",\"ce:Get*\"]"));
        assert!(json.contains("\"Resource\":\"*\""));
        assert!(!json.contains("Principal"));
    }

    #[test]
    fn test_allow_statement_sorts_and_dedups_actions() {
        let stmt = Statement::allow(
            "S",
            vec![
                "ce:Get*".to_string(),
                "budgets:ViewBudget".to_string(),
                "ce:Get*".to_string(),
            ],
            "*",
        );
        match stmt.action {
            StringOrList::Multiple(values) => {
                assert_eq!(values, vec!["budgets:ViewBudget", "ce:Get*"])
            }
            _ => panic!("expected multiple actions"),
        }
    }

    #[test]
    fn test_single_action_collapses_to_string() {
        let stmt = Statement::allow("S", vec!["sts:AssumeRole".to_string()], "*");
        let json = serde_json::to_string(&stmt).unwrap();
        assert!(json.contains("\"Action\":\"sts:AssumeRole\""));
    }

    #[test]
    fn test_federated_principal_serialization() {
        let stmt = Statement::trust(
            PrincipalClause::Federated("accounts.google.com".to_string()),
            "sts:AssumeRoleWithWebIdentity",
            None,
        );
        let json = serde_json::to_string(&stmt).unwrap();
        assert!(json.contains("\"Principal\":{\"Federated\":\"accounts.google.com\"}"));
        assert!(!json.contains("Resource"));
    }

    #[test]
    fn test_aws_principal_serialization() {
        let stmt = Statement::trust(
            PrincipalClause::Aws("arn:aws:iam::123456789012:role/FrugalReadOnly".to_string()),
            "sts:AssumeRole",
            None,
        );
        let json = serde_json::to_string(&stmt).unwrap();
        assert!(json.contains("\"Principal\":{\"AWS\":\"arn:aws:iam::123456789012:role/FrugalReadOnly\"}"));
    }

    #[test]
    fn test_condition_block_serialization() {
        let mut conds = BTreeMap::new();
        conds.insert("accounts.google.com:aud".to_string(), "999111222".to_string());
        conds.insert("accounts.google.com:sub".to_string(), "999111222".to_string());
        let stmt = Statement::trust(
            PrincipalClause::Federated("accounts.google.com".to_string()),
            "sts:AssumeRoleWithWebIdentity",
            Some(ConditionBlock {
                string_equals: conds,
            }),
        );
        let json = serde_json::to_string(&stmt).unwrap();
        assert!(json.contains(
            "\"Condition\":{\"StringEquals\":{\"accounts.google.com:aud\":\"999111222\",\"accounts.google.com:sub\":\"999111222\"}}"
        ));
    }

    #[test]
    fn test_document_round_trip() {
        let doc = PolicyDocument::new(vec![Statement::allow(
            "S",
            vec!["logs:FilterLogEvents".to_string()],
            "*",
        )]);
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"Version\":\"2012-10-17\""));
        let parsed: PolicyDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, doc);
    }
}
