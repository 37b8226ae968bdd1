//! Frugal AWS setup CLI
//!
//! Provisions the read-only AWS access the Frugal cost monitor pulls
//! billing, metrics and resource metadata through, and tears it down again
//! with `--undo`.
//!
//! # Exit Codes
//!
//! - `ExitCode::Success` (0): run completed, the user declined the
//!   confirmation, or some additional accounts were skipped on a rejected
//!   role assumption (partial success; see the summary for the buckets)
//! - `ExitCode::Error` (2): validation failed, the primary account could not
//!   be provisioned, or discovery was requested and unavailable
//!
//! See `types::ExitCode` for the enum definition.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use frugal_connect_aws::aws::{AwsCloudIdentityApi, AwsScopedApiFactory};
use frugal_connect_aws::credentials::{self, CredentialsArtifact};
use frugal_connect_aws::identity::SetupRequest;
use frugal_connect_aws::orchestrator::{AccountOutcome, Orchestrator};
use frugal_connect_aws::plan::UndoPlan;
use frugal_connect_aws::types::AccountId;
use frugal_connect_aws::ConnectError;
use log::{debug, info};

mod output;
mod types;

use types::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "frugal-connect-aws-setup",
    author,
    version,
    about = "Provision read-only AWS access for the Frugal cost monitor",
    long_about = "Creates an IAM principal with a fixed set of read-only policies so Frugal \
can pull billing, metrics and resource metadata. With Workload Identity Federation \
(--wif) the principal is a role assumable by a Google service account and no long-lived \
keys are created; without it an IAM user with an access key pair is provisioned instead.\n\n\
Multi-account estates get a role with the same name in every additional account, chained \
back to the primary principal, so the product traverses the estate from one identity.\n\n\
frugal-connect-aws-setup FrugalReadOnly 123456789012 --wif sa@proj.iam.gserviceaccount.com:999111222\n  \
frugal-connect-aws-setup FrugalReadOnly 123456789012 --additional-accounts 210987654321,310987654321\n  \
frugal-connect-aws-setup FrugalReadOnly 123456789012 --org-accounts 'Name=prod-*'\n  \
frugal-connect-aws-setup FrugalReadOnly 123456789012 --undo"
)]
struct Cli {
    /// Name of the IAM principal to create; identical in every account
    principal_name: String,

    /// 12-digit id of the primary account
    account_id: String,

    /// Workload Identity Federation parameter
    #[arg(
        long = "wif",
        value_name = "EMAIL:SUBJECT",
        long_help = "Google service account and numeric subject id, as \
<name>@<project>.iam.gserviceaccount.com:<subject-id>. The created role trusts this \
identity through OIDC federation instead of an access key. The legacy email-only form \
is accepted when the local part starts with the numeric id, but is deprecated."
    )]
    wif: Option<String>,

    /// Comma-separated ids of additional accounts to provision
    #[arg(
        long = "additional-accounts",
        value_name = "CSV",
        conflicts_with = "org_accounts",
        long_help = "Each listed account gets a role with the shared principal name, \
trusted by the primary principal. Every element must be a 12-digit account id; one \
invalid element rejects the whole list."
    )]
    additional_accounts: Option<String>,

    /// Discover additional accounts from the organization
    #[arg(
        long = "org-accounts",
        value_name = "FILTER",
        long_help = "Filter expression selecting member accounts: 'all' (every active \
account), 'ou:<id>' (active accounts directly under an organizational unit), \
'Name=<glob>' (active accounts whose display name matches), or 'Status=<value>'. \
Requires permission to list the organization's accounts."
    )]
    org_accounts: Option<String>,

    /// Admin role assumed in additional accounts to provision them
    #[arg(
        long = "assume-role",
        value_name = "ROLE",
        default_value = frugal_connect_aws::catalog::DEFAULT_ADMIN_ROLE,
        long_help = "Name of the pre-existing admin role the tool assumes in each \
additional account to create resources there. Accounts created through Organizations \
carry OrganizationAccountAccessRole automatically."
    )]
    assume_role: String,

    /// Remove everything a previous run created
    #[arg(long = "undo")]
    undo: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long = "yes")]
    yes: bool,

    /// AWS region for API clients (defaults to the ambient configuration)
    #[arg(long = "region", value_name = "REGION")]
    region: Option<String>,

    /// Where to write the credentials file
    #[arg(long = "output", value_name = "PATH")]
    output: Option<PathBuf>,

    /// Enable debug logging output to stderr
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

/// Initialize logging based on configuration
fn init_logging(debug: bool) {
    let log_level = if debug {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_target(false)
        .format_timestamp_secs()
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // Validation happens before any client is built or network call made.
    let request = SetupRequest {
        principal_name: cli.principal_name.clone(),
        primary_account: cli.account_id.clone(),
        wif: cli.wif.clone(),
        additional_accounts: cli.additional_accounts.clone(),
        org_accounts: cli.org_accounts.clone(),
        admin_role: cli.assume_role.clone(),
    };
    let target = frugal_connect_aws::resolve(&request).map_err(ConnectError::Validation)?;
    debug!("resolved target for principal '{}'", target.principal_name);

    let artifact_path = cli
        .output
        .clone()
        .unwrap_or_else(|| credentials::default_artifact_path(&target.principal_name));

    let api = Arc::new(AwsCloudIdentityApi::from_env(cli.region.clone()).await);
    let factory = Arc::new(AwsScopedApiFactory::new(cli.region.clone()));
    let orchestrator = Orchestrator::new(api, factory);

    let (accounts, warnings) = orchestrator
        .resolve_accounts(&target)
        .await
        .context("failed to resolve the account set")?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }

    if cli.undo {
        let plan = UndoPlan {
            principal_name: target.principal_name.clone(),
            accounts: accounts.clone(),
            artifact_path: artifact_path.clone(),
        };
        output::render_undo_plan(&plan);
        if !cli.yes && !output::confirm("Tear down these resources?")? {
            println!("Aborted, nothing was removed.");
            return Ok(ExitCode::Success);
        }

        let summary = orchestrator
            .undo(&target, &accounts)
            .await
            .context("teardown failed")?;
        let removed = credentials::remove_artifact(&artifact_path)
            .context("failed to remove the credentials file")?;
        output::render_undo_summary(&summary, removed, &artifact_path);
        return Ok(ExitCode::Success);
    }

    let plan = orchestrator
        .compute_plan(&target, &accounts)
        .await
        .context("failed to compute the provisioning plan")?;
    output::render_plan(&plan);
    if !cli.yes && !output::confirm("Proceed with provisioning?")? {
        println!("Aborted, nothing was changed.");
        return Ok(ExitCode::Success);
    }

    let summary = orchestrator.provision(&target, &accounts).await?;

    let provisioned_additional: Vec<AccountId> = summary
        .outcomes
        .iter()
        .filter(|(id, outcome)| {
            *id != target.primary && matches!(outcome, AccountOutcome::Provisioned(_))
        })
        .map(|(id, _)| id.clone())
        .collect();
    let artifact = CredentialsArtifact::for_run(
        &target,
        orchestrator.provisioner(),
        &provisioned_additional,
        summary.access_key.as_ref(),
    );
    artifact
        .write(&artifact_path)
        .context("failed to write the credentials file")?;
    info!("wrote credentials artifact to {}", artifact_path.display());

    output::render_summary(&summary, Some(artifact_path.as_path()));

    // Skipped additional accounts are reported in the summary but do not
    // fail the run; re-run after fixing the trust relationship to pick
    // them up. A stricter non-zero-on-partial mode may be worth adding.
    Ok(ExitCode::Success)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_cli_command_error(e);
            ExitCode::Error
        }
    };

    process::exit(code.into());
}

fn print_cli_command_error(e: anyhow::Error) {
    eprintln!("Error: {e}");
    let mut source = e.source();
    while let Some(err) = source {
        eprintln!("  Caused by: {err}");
        source = err.source();
    }
}
