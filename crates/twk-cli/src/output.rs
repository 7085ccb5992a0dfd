use std::fmt::Write;

use colored::{ColoredString, Colorize};
use serde_json::{json, Value};
use twk_engine::{BatchReport, Catalog};
use twk_ledger::{LedgerEntry, MutationLedger, RestoreReport};
use twk_types::{DriftRecord, RawValue, TweakStatus};

fn status_label(status: TweakStatus) -> ColoredString {
    let text = format!("{:<11}", status.to_string());
    match status {
        TweakStatus::Applied => text.green(),
        TweakStatus::PartiallyApplied => text.yellow(),
        TweakStatus::NotApplied => text.dimmed(),
        TweakStatus::Error => text.red(),
        TweakStatus::Unknown => text.normal(),
    }
}

pub fn status_text(catalog: &Catalog, module: Option<&str>) -> String {
    let mut out = String::new();
    for m in &catalog.modules {
        if module.is_some_and(|name| !m.name.eq_ignore_ascii_case(name)) {
            continue;
        }
        let applied = m.tweaks.iter().filter(|t| t.status.is_applied()).count();
        let _ = writeln!(
            out,
            "{} ({}/{} applied)",
            m.name.bold(),
            applied,
            m.tweaks.len()
        );
        for t in &m.tweaks {
            let reboot = if t.requires_reboot {
                " [reboot]".dimmed().to_string()
            } else {
                String::new()
            };
            let _ = writeln!(
                out,
                "  {} {:<24} {}{}",
                status_label(t.status),
                t.id.cyan(),
                t.name,
                reboot
            );
        }
    }
    out
}

pub fn status_json(catalog: &Catalog, module: Option<&str>) -> Value {
    let modules: Vec<Value> = catalog
        .modules
        .iter()
        .filter(|m| module.map_or(true, |name| m.name.eq_ignore_ascii_case(name)))
        .map(|m| {
            json!({
                "name": m.name,
                "tweaks": m.tweaks.iter().map(|t| json!({
                    "id": t.id,
                    "name": t.name,
                    "risk": t.risk,
                    "requires_reboot": t.requires_reboot,
                    "status": t.status.to_string(),
                })).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "modules": modules })
}

pub fn report_text(report: &BatchReport) -> String {
    let mut out = String::new();
    for o in &report.outcomes {
        if o.success {
            let _ = writeln!(out, "{} {}", "✓".green().bold(), o.tweak_name);
        } else {
            let reason = o.reason.as_ref().map(ToString::to_string).unwrap_or_default();
            let _ = writeln!(out, "{} {}: {}", "✗".red().bold(), o.tweak_name, reason.red());
        }
    }
    let _ = writeln!(
        out,
        "{} succeeded, {} failed",
        report.succeeded().to_string().green(),
        report.failed().to_string().red()
    );
    if report.requires_reboot() {
        let _ = writeln!(
            out,
            "{}",
            "A reboot is required for some changes to take effect.".yellow()
        );
    }
    out
}

pub fn restore_text(report: &RestoreReport) -> String {
    let mut out = String::new();
    for address in &report.restored {
        let _ = writeln!(out, "  {} {}", "restored".green(), address);
    }
    for (address, error) in &report.failed {
        let _ = writeln!(out, "  {} {}: {}", "failed".red(), address, error);
    }
    if report.is_complete() {
        let _ = writeln!(out, "{} All changes restored.", "✓".green().bold());
    } else {
        let _ = writeln!(
            out,
            "{} {} value(s) could not be restored; they remain in the ledger.",
            "✗".red().bold(),
            report.failed.len()
        );
    }
    out
}

pub fn restore_json(report: &RestoreReport) -> Value {
    json!({
        "restored": report.restored.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "failed": report.failed.iter().map(|(a, e)| json!({
            "address": a.to_string(),
            "error": e.to_string(),
        })).collect::<Vec<_>>(),
    })
}

pub fn drift_text(drift: &[DriftRecord]) -> String {
    if drift.is_empty() {
        return format!("{} No drift since the last snapshot.\n", "✓".green());
    }
    let mut out = format!(
        "{} {} tweak(s) were reverted outside twk:\n",
        "!".yellow().bold(),
        drift.len()
    );
    for d in drift {
        let _ = writeln!(out, "  [{}] {} ({})", d.module, d.tweak_name, d.tweak_id.cyan());
    }
    out
}

fn describe(entry: &LedgerEntry) -> String {
    match entry.raw_value() {
        None => "(absent)".into(),
        Some(v) => describe_value(&v),
    }
}

fn describe_value(value: &RawValue) -> String {
    if let Some(i) = value.as_integer() {
        format!("integer {i}")
    } else if let Some(s) = value.as_text() {
        format!("text {s:?}")
    } else {
        format!("binary {} bytes", value.data.len())
    }
}

pub fn ledger_text(ledger: &MutationLedger) -> String {
    let mut out = String::new();
    if let Some(e) = ledger.load_error() {
        let _ = writeln!(out, "{} ledger file rejected: {}", "!".yellow().bold(), e);
    }
    if ledger.is_empty() {
        let _ = writeln!(out, "No captured values.");
        return out;
    }
    let _ = writeln!(out, "{} captured value(s), oldest first:", ledger.len());
    for entry in ledger.entries() {
        let _ = writeln!(out, "  {} = {}", entry.address, describe(entry).dimmed());
    }
    out
}

pub fn ledger_json(ledger: &MutationLedger) -> Value {
    json!({
        "load_error": ledger.load_error().map(ToString::to_string),
        "entries": ledger.entries().iter().map(|e| json!({
            "address": e.address,
            "existed": e.existed,
            "value": e.raw_value(),
        })).collect::<Vec<_>>(),
    })
}
