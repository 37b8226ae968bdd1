//! Integration tests for the setup CLI binary.
//!
//! These exercise argument parsing and pre-flight validation, which must all
//! fail before any provider API call is attempted.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

/// Helper function to get the CLI binary command
fn cli_command() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("frugal-connect-aws-setup"))
}

#[test]
fn test_cli_help() {
    cli_command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Provision read-only AWS access for the Frugal cost monitor",
        ))
        .stdout(predicate::str::contains("--wif"))
        .stdout(predicate::str::contains("--additional-accounts"))
        .stdout(predicate::str::contains("--org-accounts"))
        .stdout(predicate::str::contains("--undo"));
}

#[test]
fn test_cli_version() {
    cli_command()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_no_arguments() {
    cli_command()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_rejects_short_account_id() {
    cli_command()
        .args(["FrugalReadOnly", "12345"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid account id"))
        .stderr(predicate::str::contains("expected exactly 12 digits"));
}

#[test]
fn test_rejects_non_numeric_account_id() {
    cli_command()
        .args(["FrugalReadOnly", "12345678901a"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid account id"));
}

#[test]
fn test_rejects_invalid_principal_name() {
    cli_command()
        .args(["bad name", "123456789012"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid principal name"));
}

#[test]
fn test_additional_accounts_all_or_nothing() {
    // One bad element rejects the entire run; the valid ids do not survive.
    cli_command()
        .args([
            "FrugalReadOnly",
            "123456789012",
            "--additional-accounts",
            "210987654321,bad,310987654321",
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid account id 'bad'"));
}

#[test]
fn test_rejects_malformed_wif_parameter() {
    cli_command()
        .args([
            "FrugalReadOnly",
            "123456789012",
            "--wif",
            "sa@proj.iam.gserviceaccount.com:not-numeric",
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid service account"));
}

#[test]
fn test_rejects_legacy_wif_without_numeric_prefix() {
    cli_command()
        .args([
            "FrugalReadOnly",
            "123456789012",
            "--wif",
            "billing-sa@proj.iam.gserviceaccount.com",
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid service account"));
}

#[test]
fn test_rejects_unknown_org_filter() {
    cli_command()
        .args([
            "FrugalReadOnly",
            "123456789012",
            "--org-accounts",
            "everything",
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid account filter"));
}

#[test]
fn test_account_source_flags_conflict() {
    cli_command()
        .args([
            "FrugalReadOnly",
            "123456789012",
            "--additional-accounts",
            "210987654321",
            "--org-accounts",
            "all",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_undo_still_validates_inputs() {
    cli_command()
        .args(["FrugalReadOnly", "bad-id", "--undo"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid account id"));
}
