//! Error types for the Frugal AWS connector

use thiserror::Error;

/// Main error type for connector operations
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("organization discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    AssumeRole(#[from] AssumeRoleError),

    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("teardown failed: {0}")]
    Teardown(#[from] TeardownError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type ConnectResult<T> = Result<T, ConnectError>;

/// Pre-flight input validation failures. Always fatal, raised before any
/// network call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid account id '{0}': expected exactly 12 digits")]
    InvalidAccountId(String),

    #[error(
        "invalid service account '{0}': expected <name>@<project>.iam.gserviceaccount.com:<numeric-subject-id>"
    )]
    InvalidServiceAccountFormat(String),

    #[error(
        "invalid account filter '{0}': expected 'all', 'ou:<id>', 'Name=<glob>' or 'Status=<value>'"
    )]
    InvalidAccountFilter(String),

    #[error("invalid principal name '{0}': names must be 1-64 characters from [a-zA-Z0-9+=,.@_-]")]
    InvalidPrincipalName(String),

    #[error("--additional-accounts and --org-accounts are mutually exclusive")]
    ConflictingAccountSources,
}

/// Organizations API failures during account discovery. Fatal only when
/// discovery was explicitly requested with `--org-accounts`.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("organizations API unavailable: {0}")]
    Unavailable(String),
}

/// A role assumption that was rejected. Carries the attempted role ARN and
/// the identity that attempted it so a missing trust relationship can be
/// diagnosed from the message alone.
#[derive(Error, Debug)]
#[error("could not assume {role_arn} as {caller_arn}: {message}")]
pub struct AssumeRoleError {
    /// ARN of the role the broker tried to assume
    pub role_arn: String,
    /// ARN of the caller whose credentials were used for the attempt
    pub caller_arn: String,
    /// Provider-reported failure detail
    pub message: String,
}

/// Create/attach failures while provisioning a principal. Fatal when they
/// hit the primary account, bucketed per-account otherwise.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(
        "access key limit reached for user '{user}': delete an unused key with \
         `aws iam delete-access-key` and re-run"
    )]
    AccessKeyLimit { user: String },
}

/// Best-effort teardown failures during `--undo`. Logged and reported, never
/// allowed to stop the remaining teardown steps.
#[derive(Error, Debug)]
#[error("{step} in account {account_id}: {message}")]
pub struct TeardownError {
    /// Teardown step that failed (e.g. "DetachRolePolicy")
    pub step: String,
    /// Account the step ran against
    pub account_id: String,
    /// Provider-reported failure detail
    pub message: String,
}

/// Error surface of the [`CloudIdentityApi`](crate::api::CloudIdentityApi)
/// capability trait.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{operation} failed: {message}")]
    Call {
        operation: &'static str,
        message: String,
    },

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("entity already exists: {0}")]
    AlreadyExists(String),

    #[error("access key limit exceeded for user '{0}'")]
    LimitExceeded(String),
}

impl ApiError {
    pub fn call(operation: &'static str, message: impl ToString) -> Self {
        Self::Call {
            operation,
            message: message.to_string(),
        }
    }
}
