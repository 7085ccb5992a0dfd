use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use twk_engine::{BatchReport, Session, TwkConfig};
use twk_ledger::LedgerFile;
use twk_types::DriftRecord;

use crate::cli::*;
use crate::output;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Status(args) => cmd_status(&config, format, args),
        Command::Apply(args) => cmd_batch(&config, format, |s| Ok(s.apply(&args.ids)?)),
        Command::Revert(args) => cmd_batch(&config, format, |s| Ok(s.revert(&args.ids)?)),
        Command::ApplyModule(args) => {
            cmd_batch(&config, format, |s| Ok(s.apply_module(&args.module)?))
        }
        Command::RevertModule(args) => {
            cmd_batch(&config, format, |s| Ok(s.revert_module(&args.module)?))
        }
        Command::RestoreAll => cmd_restore_all(&config, format),
        Command::Drift => cmd_drift(&config, format),
        Command::Snapshot => cmd_snapshot(&config, format),
        Command::Ledger(args) => cmd_ledger(&config, format, args),
        Command::Shell => crate::shell::run(&config),
    }
}

/// Configuration file, then command-line overrides.
fn resolve_config(cli: &Cli) -> anyhow::Result<TwkConfig> {
    let mut config = TwkConfig::discover(cli.config.as_deref(), cli.data_dir.as_deref())
        .context("failed to load configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(catalog) = &cli.catalog {
        config.catalog = Some(catalog.clone());
    }
    config.elevated |= cli.elevated;
    Ok(config)
}

fn open(config: &TwkConfig) -> anyhow::Result<Session> {
    Session::open(config).context("failed to open session")
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_status(config: &TwkConfig, format: OutputFormat, args: StatusArgs) -> anyhow::Result<()> {
    let session = open(config)?;
    let module = args.module.as_deref();
    if let Some(name) = module {
        if session.catalog().module(name).is_none() {
            bail!("unknown module: {name}");
        }
    }
    match format {
        OutputFormat::Json => print_json(&output::status_json(session.catalog(), module)),
        OutputFormat::Text => {
            print!("{}", output::status_text(session.catalog(), module));
            Ok(())
        }
    }
}

/// Drift found before the command changed anything, shown ahead of its
/// result since the saved snapshot will no longer record it.
fn print_drift(drift: &[DriftRecord]) {
    if !drift.is_empty() {
        print!("{}", output::drift_text(drift));
    }
}

/// Run a batch operation, reporting drift detected before it.
fn run_batch(
    config: &TwkConfig,
    op: impl FnOnce(&mut Session) -> anyhow::Result<BatchReport>,
) -> anyhow::Result<(BatchReport, Vec<DriftRecord>)> {
    let mut session = open(config)?;
    let drift = session.check_drift();
    let report = op(&mut session)?;
    session.finish();
    Ok((report, drift))
}

fn cmd_batch(
    config: &TwkConfig,
    format: OutputFormat,
    op: impl FnOnce(&mut Session) -> anyhow::Result<BatchReport>,
) -> anyhow::Result<()> {
    let (report, drift) = run_batch(config, op)?;
    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(&report)?;
            value["drift"] = serde_json::to_value(&drift)?;
            print_json(&value)?
        }
        OutputFormat::Text => {
            print_drift(&drift);
            print!("{}", output::report_text(&report))
        }
    }
    if report.failed() > 0 {
        bail!("{} tweak(s) failed", report.failed());
    }
    Ok(())
}

fn cmd_restore_all(config: &TwkConfig, format: OutputFormat) -> anyhow::Result<()> {
    let mut session = open(config)?;
    if session.ledger().is_empty() {
        match format {
            OutputFormat::Json => print_json(&json!({ "restored": [], "failed": [] }))?,
            OutputFormat::Text => println!("Nothing to restore."),
        }
        return Ok(());
    }
    let drift = session.check_drift();
    let report = session.restore_all();
    session.finish();
    match format {
        OutputFormat::Json => {
            let mut value = output::restore_json(&report);
            value["drift"] = serde_json::to_value(&drift)?;
            print_json(&value)?
        }
        OutputFormat::Text => {
            print_drift(&drift);
            print!("{}", output::restore_text(&report))
        }
    }
    if !report.is_complete() {
        bail!("{} value(s) could not be restored", report.failed.len());
    }
    Ok(())
}

fn cmd_drift(config: &TwkConfig, format: OutputFormat) -> anyhow::Result<()> {
    let session = open(config)?;
    let drift = session.detect_drift();
    match format {
        OutputFormat::Json => print_json(&json!({ "drift": drift })),
        OutputFormat::Text => {
            print!("{}", output::drift_text(&drift));
            Ok(())
        }
    }
}

fn cmd_snapshot(config: &TwkConfig, format: OutputFormat) -> anyhow::Result<()> {
    let mut session = open(config)?;
    let drift = session.check_drift();
    let snapshot = session.save_snapshot()?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "path": session.detector().path(),
            "applied": snapshot.applied_count(),
            "drift": drift,
        })),
        OutputFormat::Text => {
            print_drift(&drift);
            println!(
                "{} Snapshot saved: {} applied tweak(s) recorded.",
                "✓".green().bold(),
                snapshot.applied_count()
            );
            Ok(())
        }
    }
}

fn cmd_ledger(config: &TwkConfig, format: OutputFormat, args: LedgerArgs) -> anyhow::Result<()> {
    if args.verify {
        let file = LedgerFile::new(config.ledger_path());
        let result = file.load();
        match (&result, format) {
            (Ok(entries), OutputFormat::Json) => {
                print_json(&json!({ "valid": true, "entries": entries.len() }))?
            }
            (Err(e), OutputFormat::Json) => {
                print_json(&json!({ "valid": false, "error": e.to_string() }))?
            }
            (Ok(entries), OutputFormat::Text) => println!(
                "{} Ledger verified: {} entr{}",
                "✓".green().bold(),
                entries.len(),
                if entries.len() == 1 { "y" } else { "ies" }
            ),
            (Err(e), OutputFormat::Text) => println!("{} {}", "✗".red().bold(), e),
        }
        return result
            .map(|_| ())
            .with_context(|| format!("ledger {} failed verification", file.path().display()));
    }

    let session = open(config)?;
    match format {
        OutputFormat::Json => print_json(&output::ledger_json(session.ledger())),
        OutputFormat::Text => {
            print!("{}", output::ledger_text(session.ledger()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use twk_store::ValueStore;
    use twk_types::{Address, RootNamespace};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("twk.toml"),
            "elevated = false\ncatalog = \"from-file.toml\"\n",
        )
        .unwrap();
        let data_dir = dir.path().to_str().unwrap();

        let config = resolve_config(&parse(&["twk", "--data-dir", data_dir, "status"])).unwrap();
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.catalog.as_deref(), Some(std::path::Path::new("from-file.toml")));
        assert!(!config.elevated);

        let config = resolve_config(&parse(&[
            "twk", "--data-dir", data_dir, "--catalog", "cli.toml", "--elevated", "status",
        ]))
        .unwrap();
        assert_eq!(config.catalog.as_deref(), Some(std::path::Path::new("cli.toml")));
        assert!(config.elevated);
    }

    #[test]
    fn apply_then_restore_all_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();

        run_command(parse(&["twk", "--data-dir", data_dir, "apply", "fps_transparency"])).unwrap();
        assert!(dir.path().join("backup.dat").exists());
        assert!(dir.path().join("snapshot.dat").exists());

        run_command(parse(&["twk", "--data-dir", data_dir, "ledger", "--verify"])).unwrap();
        run_command(parse(&["twk", "--data-dir", data_dir, "restore-all"])).unwrap();
        assert!(!dir.path().join("backup.dat").exists());
    }

    #[test]
    fn machine_tweak_fails_without_elevation() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        let err =
            run_command(parse(&["twk", "--data-dir", data_dir, "apply", "fps_mpo"])).unwrap_err();
        assert!(err.to_string().contains("1 tweak(s) failed"));

        run_command(parse(&[
            "twk", "--data-dir", data_dir, "--elevated", "apply", "fps_mpo",
        ]))
        .unwrap();
    }

    #[test]
    fn drift_is_reported_by_an_unrelated_apply() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        run_command(parse(&["twk", "--data-dir", data_dir, "apply", "fps_transparency"])).unwrap();

        // Something outside twk turns transparency back on.
        let store = twk_store::JsonFileValueStore::open(dir.path().join("store.json")).unwrap();
        let transparency = Address::new(
            RootNamespace::CurrentUser,
            "Software\\Microsoft\\Windows\\CurrentVersion\\Themes\\Personalize",
            "EnableTransparency",
        );
        store.write_integer(&transparency, 1).unwrap();
        drop(store);

        let config = resolve_config(&parse(&["twk", "--data-dir", data_dir, "status"])).unwrap();
        let ids = vec!["fps_menu_delay".to_string()];
        let (report, drift) = run_batch(&config, |s| Ok(s.apply(&ids)?)).unwrap();
        assert_eq!(report.succeeded(), 1);
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].tweak_id, "fps_transparency");

        let (_, drift) = run_batch(&config, |s| Ok(s.apply(&ids)?)).unwrap();
        assert!(drift.is_empty());
    }

    #[test]
    fn tampered_ledger_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        run_command(parse(&["twk", "--data-dir", data_dir, "apply", "fps_transparency"])).unwrap();

        let path = dir.path().join("backup.dat");
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("HKCU", "HKLM")).unwrap();
        let verify = run_command(parse(&["twk", "--data-dir", data_dir, "ledger", "--verify"]));
        assert!(verify.is_err());
    }
}
