// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot CLI commands: resolve, reconcile, key, configure, signup, verify.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use zapflow_agent::{ConfigureRequest, ReconcileOutcome, ReconcileReport, SignupRequest};
use zapflow_core::{ConversationKey, InstanceName, OwnerId, Session, ZapflowError};

use crate::app::App;
use crate::output;
use crate::{ConfigureArgs, SignupArgs};

/// Env var read by `signup` and `configure --email` before prompting.
pub const PASSWORD_ENV: &str = "ZAPFLOW_PASSWORD";

/// How long `signup` waits for the lead webhook before exiting.
const LEAD_DELIVERY_WAIT: Duration = Duration::from_secs(10);

pub async fn run_resolve(app: &App, name: &str, no_create: bool, json: bool) -> Result<(), ZapflowError> {
    let name = InstanceName::parse(name)?;
    let resolved = if no_create {
        app.directory.find(&name).await
    } else {
        app.directory.resolve(&name).await
    };

    let Some(resolved) = resolved else {
        if json {
            output::print_json(&json!({ "instance": name.as_str(), "resolved": null }));
        }
        return Err(ZapflowError::InstanceUnresolved {
            instance_name: name.to_string(),
        });
    };

    if json {
        output::print_json(&json!({ "instance": name.as_str(), "resolved": resolved }));
    } else {
        output::header(&format!("zapflow resolve: {name}"));
        output::field("Id", &resolved.remote_id);
        output::field("Phone", resolved.phone.as_deref().unwrap_or("(not paired)"));
        println!();
    }
    Ok(())
}

pub async fn run_logout(app: &App, name: &str, json: bool) -> Result<(), ZapflowError> {
    let name = InstanceName::parse(name)?;
    app.api.logout(&name).await?;
    if json {
        output::print_json(&json!({ "instance": name.as_str(), "logged_out": true }));
    } else {
        println!("logged out: {name}");
        println!("  Pair again with: zapflow connect {name}");
    }
    Ok(())
}

pub async fn run_reconcile(app: &App, owner: &str, json: bool) -> Result<(), ZapflowError> {
    let report = app.reconciler().reconcile(&OwnerId(owner.to_string())).await?;
    if json {
        output::print_json(&report);
    } else {
        print_report(&report);
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(ZapflowError::Internal(format!(
            "reconciliation for owner {owner} left configurations needing another run"
        )))
    }
}

/// Human rendering of a reconciliation report.
pub fn print_report(report: &ReconcileReport) {
    output::header(&format!("zapflow reconcile: {}", report.owner_id));
    if report.configs.is_empty() {
        println!("    no active configurations");
    }
    for entry in &report.configs {
        let ok = !entry.outcome.needs_retry();
        output::row(&entry.instance_name, &describe_outcome(&entry.outcome), ok);
    }
    println!();
    println!("    {} message(s) moved", report.messages_moved());
    println!();
}

fn describe_outcome(outcome: &ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::Unresolved => "instance unresolved".to_string(),
        ReconcileOutcome::Bound {
            instance_id,
            messages,
        } => format!("bound to {instance_id} ({messages} moved)"),
        ReconcileOutcome::Unchanged {
            instance_id,
            phone_updated,
        } => {
            if *phone_updated {
                format!("{instance_id} (phone updated)")
            } else {
                instance_id.clone()
            }
        }
        ReconcileOutcome::Rekeyed { old, new, messages } => {
            format!("{old} -> {new} ({messages} moved)")
        }
        ReconcileOutcome::ConfigUpdateFailed { error } => format!("config update failed: {error}"),
        ReconcileOutcome::MessagesStale { old, new, error } => {
            format!("messages still under {old}, config at {new}: {error}")
        }
    }
}

pub fn run_key(instance_id: &str, phone: &str, json: bool) {
    let key = ConversationKey::build(instance_id, phone);
    if json {
        output::print_json(&json!({ "key": key }));
    } else {
        println!("{key}");
    }
}

pub async fn run_configure(app: &App, args: ConfigureArgs, json: bool) -> Result<(), ZapflowError> {
    let session = match (&args.owner, &args.email) {
        (Some(owner), _) => Session::service(OwnerId(owner.clone())),
        (None, Some(email)) => {
            let password = read_password("Password: ")?;
            app.signup_flow()?.sign_in(email, &password).await?
        }
        (None, None) => {
            return Err(ZapflowError::invalid("owner", "pass --owner or --email"));
        }
    };

    let request = ConfigureRequest {
        bot_name: args.bot_name,
        company: args.company,
        category: args.category,
        tone: args.tone,
        instance_name: args.instance_name,
    };
    let outcome = app.chatbot_service().configure(&session, request).await?;

    if json {
        output::print_json(&outcome);
        return Ok(());
    }

    let config = &outcome.config;
    output::header(&format!("zapflow configure: {}", config.bot_name));
    output::field("Config", &config.id);
    output::field("Instance", &config.instance_name);
    output::row(
        "Remote id",
        config.instance_id.as_deref().unwrap_or("unresolved"),
        config.instance_id.is_some(),
    );
    println!();
    for warning in &outcome.warnings {
        output::warning(warning);
    }
    println!("  Pair a phone with: zapflow connect {}", config.instance_name);
    Ok(())
}

#[derive(Debug, Serialize)]
struct SignupSummary<'a> {
    owner_id: &'a OwnerId,
    needs_confirmation: bool,
    warnings: &'a [String],
}

pub async fn run_signup(app: &App, args: SignupArgs, json: bool) -> Result<(), ZapflowError> {
    let (password, password_confirmation) = match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => (password.clone(), password),
        _ => (
            read_password("Password: ")?,
            read_password("Confirm password: ")?,
        ),
    };

    let request = SignupRequest {
        email: args.email,
        password,
        password_confirmation,
        full_name: args.full_name,
        company: args.company,
        phone: args.phone,
        plan: args.plan,
    };
    let mut outcome = app.signup_flow()?.sign_up(request).await?;

    if let Some(delivery) = outcome.lead_delivery.take()
        && tokio::time::timeout(LEAD_DELIVERY_WAIT, delivery).await.is_err()
    {
        output::warning("lead notification still pending at exit");
    }

    let needs_confirmation = outcome.needs_confirmation();
    if json {
        output::print_json(&SignupSummary {
            owner_id: &outcome.owner_id,
            needs_confirmation,
            warnings: &outcome.warnings,
        });
        return Ok(());
    }

    output::header("zapflow signup");
    output::field("Owner", outcome.owner_id.as_str());
    println!();
    for warning in &outcome.warnings {
        output::warning(warning);
    }
    if needs_confirmation {
        println!("  Check your inbox, then run: zapflow verify <email> <code>");
    } else {
        println!("  Account ready.");
    }
    Ok(())
}

pub async fn run_verify(app: &App, email: &str, code: &str, json: bool) -> Result<(), ZapflowError> {
    let session = app.signup_flow()?.verify_otp(email, code).await?;
    if json {
        output::print_json(&json!({ "owner_id": session.owner_id, "verified": true }));
    } else {
        println!("verified: {}", session.owner_id);
    }
    Ok(())
}

fn read_password(prompt: &str) -> Result<String, ZapflowError> {
    if let Ok(password) = std::env::var(PASSWORD_ENV)
        && !password.is_empty()
    {
        return Ok(password);
    }
    rpassword::prompt_password(prompt)
        .map_err(|e| ZapflowError::Internal(format!("failed to read password: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapflow_agent::ConfigReconciliation;

    #[test]
    fn outcome_descriptions_name_both_ids() {
        let text = describe_outcome(&ReconcileOutcome::Rekeyed {
            old: "old-id".into(),
            new: "new-id".into(),
            messages: 3,
        });
        assert_eq!(text, "old-id -> new-id (3 moved)");

        let text = describe_outcome(&ReconcileOutcome::Unchanged {
            instance_id: "abc".into(),
            phone_updated: true,
        });
        assert_eq!(text, "abc (phone updated)");
    }

    #[test]
    fn report_json_is_tagged() {
        let report = ReconcileReport {
            owner_id: OwnerId("u-1".into()),
            configs: vec![ConfigReconciliation {
                config_id: "c-1".into(),
                instance_name: "nina-clinicasp".into(),
                outcome: ReconcileOutcome::Bound {
                    instance_id: "abc".into(),
                    messages: 2,
                },
            }],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["owner_id"], "u-1");
        assert_eq!(value["configs"][0]["outcome"], "bound");
        assert_eq!(value["configs"][0]["messages"], 2);
    }
}
