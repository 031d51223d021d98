//! Output formatting for CLI responses

use anyhow::Error;
use colored::*;
use serde_json::{Value, json};
use track_skins::{CompositionPlan, CompositionReport, Disposal, PlanOperation, SkinRecord};

fn print_json(value: &Value, what: &str) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to format {} as JSON: {}", what, e),
    }
}

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    print_json(
        &json!({
            "success": false,
            "error": {
                "message": error.to_string(),
            }
        }),
        "error",
    );
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

pub fn print_skin_list(track_id: &str, skins: &[SkinRecord], json: bool) {
    if json {
        print_json(
            &json!({
                "success": true,
                "track": track_id,
                "skins": skins,
            }),
            "skin list",
        );
        return;
    }

    if skins.is_empty() {
        println!("{}", format!("No skins installed for {}", track_id).yellow());
        return;
    }

    println!("{}", format!("Skins for {}:", track_id).bold());
    for skin in skins {
        let marker = match (skin.is_enabled, skin.is_active) {
            (false, _) => "○".dimmed(),
            (true, true) => "●".green(),
            (true, false) => "●".normal(),
        };
        let categories: Vec<&str> = skin.categories.iter().map(String::as_str).collect();
        println!(
            "  {} {} (priority {}){}",
            marker,
            skin.id.as_str().bold(),
            skin.priority,
            if categories.is_empty() {
                String::new()
            } else {
                format!(" [{}]", categories.join(", "))
            }
        );
    }
}

fn disposal_name(disposal: Disposal) -> &'static str {
    match disposal {
        Disposal::Delete => "delete",
        Disposal::Recycle => "recycle",
    }
}

fn operation_json(operation: &PlanOperation) -> Value {
    match operation {
        PlanOperation::Remove { target, disposal } => json!({
            "action": "remove",
            "target": target,
            "disposal": disposal_name(*disposal),
        }),
        PlanOperation::Replace {
            target,
            source,
            disposal,
        } => json!({
            "action": "replace",
            "target": target,
            "source": source,
            "disposal": disposal_name(*disposal),
        }),
        PlanOperation::Create { target, source } => json!({
            "action": "create",
            "target": target,
            "source": source,
        }),
    }
}

pub fn print_plan(track_id: &str, plan: &CompositionPlan, json: bool) {
    if json {
        let operations: Vec<Value> = plan.operations.iter().map(operation_json).collect();
        print_json(
            &json!({
                "success": true,
                "track": track_id,
                "operations": operations,
                "unchanged": plan.unchanged,
                "manifest": plan.manifest.ids(),
            }),
            "plan",
        );
        return;
    }

    if plan.is_noop() {
        println!("{} {} is up to date", "✓".green(), track_id.bold());
        return;
    }

    println!("{}", format!("Plan for {}:", track_id).bold());
    for operation in &plan.operations {
        match operation {
            PlanOperation::Remove { target, disposal } => println!(
                "  {} {} ({})",
                "-".red(),
                target.display(),
                disposal_name(*disposal)
            ),
            PlanOperation::Replace {
                target,
                source,
                disposal,
            } => println!(
                "  {} {} <- {} ({} old)",
                "~".yellow(),
                target.display(),
                source.display(),
                disposal_name(*disposal)
            ),
            PlanOperation::Create { target, source } => {
                println!("  {} {} <- {}", "+".green(), target.display(), source.display())
            }
        }
    }
    println!("  {} unchanged", plan.unchanged);
}

pub fn print_report(report: &CompositionReport, json: bool) {
    if json {
        print_json(
            &json!({
                "success": true,
                "report": report,
            }),
            "report",
        );
        return;
    }

    let status = if report.mutated() {
        "✓".green()
    } else {
        "=".normal()
    };
    println!(
        "{} {}: {} created, {} replaced, {} deleted, {} recycled, {} unchanged",
        status,
        report.track_id.bold(),
        report.created,
        report.replaced,
        report.deleted,
        report.recycled,
        report.unchanged
    );
    if report.copied > 0 {
        println!("  {} files copied because hard links were unavailable", report.copied);
    }
    if report.failures > 0 {
        println!("  {} failed attempts retried", report.failures.to_string().yellow());
    }
}
