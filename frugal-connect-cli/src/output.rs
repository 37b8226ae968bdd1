//! Terminal rendering and confirmation for the setup tool.

use frugal_connect_aws::orchestrator::{AccountOutcome, RunSummary, UndoOutcome, UndoSummary};
use frugal_connect_aws::plan::{AccountPlan, PolicyStatus, ProvisioningPlan, UndoPlan};
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Render the diff-style provisioning plan: `+` marks a policy that will be
/// attached, `=` one that already is.
pub fn render_plan(plan: &ProvisioningPlan) {
    println!("Plan for principal '{}':", plan.principal_name);
    for account_plan in &plan.accounts {
        render_account_plan(account_plan);
    }
    println!();
    println!(
        "{} attachment(s) will be performed.",
        plan.pending_attachments()
    );
}

fn render_account_plan(account_plan: &AccountPlan) {
    let label = if account_plan.account.is_primary {
        " (primary)"
    } else {
        ""
    };
    println!();
    println!("  Account {}{label}", account_plan.account.id);
    if let Some(error) = &account_plan.probe_error {
        println!("    ! could not inspect account: {error}");
        println!("      (assumption will be retried during apply)");
    } else if account_plan.principal_exists {
        println!("    principal exists, will be reused");
    } else {
        println!("    principal will be created");
    }
    for entry in &account_plan.entries {
        let marker = match entry.status {
            PolicyStatus::WillAttach => '+',
            PolicyStatus::AlreadyAttached => '=',
        };
        println!("    {marker} {} ({})", entry.policy_arn, entry.description);
    }
}

/// Render what `--undo` is about to remove.
pub fn render_undo_plan(plan: &UndoPlan) {
    println!("Teardown plan for principal '{}':", plan.principal_name);
    println!();
    for account in &plan.accounts {
        let label = if account.is_primary { " (primary)" } else { "" };
        println!("  Account {}{label}", account.id);
        println!("    - detach managed and custom policies");
        println!("    - delete access keys and inline policies, if any");
        println!("    - delete the principal and the custom policy");
    }
    println!();
    println!(
        "Local credentials file {} will be removed.",
        plan.artifact_path.display()
    );
}

/// Render the final run report, bucketed by outcome, with remediation hints
/// for accounts skipped on a rejected role assumption.
pub fn render_summary(summary: &RunSummary, artifact_path: Option<&Path>) {
    println!();
    println!("Provisioned accounts:");
    for (account_id, outcome) in &summary.outcomes {
        if let AccountOutcome::Provisioned(counts) = outcome {
            println!(
                "  {account_id}: {} policy attachment(s) added, {} already present",
                counts.added, counts.skipped
            );
        }
    }

    let skipped: Vec<_> = summary
        .outcomes
        .iter()
        .filter_map(|(id, outcome)| match outcome {
            AccountOutcome::SkippedAssumeRole(err) => Some((id, err)),
            _ => None,
        })
        .collect();
    if !skipped.is_empty() {
        println!();
        println!("Skipped (assume-role failed):");
        for (account_id, err) in skipped {
            println!("  {account_id}: {err}");
            println!(
                "    hint: ensure {} exists and its trust policy allows {} to call sts:AssumeRole",
                err.role_arn, err.caller_arn
            );
        }
    }

    let failed: Vec<_> = summary
        .outcomes
        .iter()
        .filter_map(|(id, outcome)| match outcome {
            AccountOutcome::Failed(message) => Some((id, message)),
            _ => None,
        })
        .collect();
    if !failed.is_empty() {
        println!();
        println!("Failed:");
        for (account_id, message) in failed {
            println!("  {account_id}: {message}");
        }
    }

    if let Some(path) = artifact_path {
        println!();
        println!("Credentials written to {}.", path.display());
    }
}

/// Render the teardown report.
pub fn render_undo_summary(summary: &UndoSummary, artifact_removed: bool, path: &Path) {
    println!();
    for (account_id, outcome) in &summary.outcomes {
        match outcome {
            UndoOutcome::Cleaned => println!("  {account_id}: cleaned up"),
            UndoOutcome::Partial(failures) => {
                println!("  {account_id}: incomplete, {} step(s) failed:", failures.len());
                for failure in failures {
                    println!("    {failure}");
                }
            }
            UndoOutcome::SkippedAssumeRole(err) => {
                println!("  {account_id}: skipped, {err}");
            }
        }
    }
    println!();
    if artifact_removed {
        println!("Removed credentials file {}.", path.display());
    } else {
        println!("No credentials file at {}.", path.display());
    }
}

/// Ask the user to confirm before mutating anything. Anything but `y`/`yes`
/// declines.
pub fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}
