//! Interactive session.
//!
//! A background drift check starts with the shell; its result is picked up
//! at the top of whichever loop iteration first sees it.

use std::io::{self, BufRead, Write};

use colored::Colorize;
use tracing::warn;
use twk_engine::{DriftMonitor, Session, TwkConfig};

use crate::output;

const HELP: &str = "\
commands:
  status [module]        show tweak status
  apply <id>...          apply tweaks
  revert <id>...         revert tweaks
  apply-module <module>  apply every tweak in a module
  revert-module <module> revert every tweak in a module
  restore-all            restore every captured value
  drift                  compare with the last snapshot
  ledger                 show captured values
  help                   this text
  quit                   save the snapshot and exit";

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Continue,
    Quit,
}

pub fn run(config: &TwkConfig) -> anyhow::Result<()> {
    let mut session = Session::open(config)?;
    let monitor = match session.spawn_drift_monitor() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = %e, "could not start background drift check");
            None
        }
    };

    if !session.is_elevated() {
        println!(
            "{}",
            "Not elevated: tweaks under HKLM will fail. Restart with --elevated.".yellow()
        );
    }
    println!("Type {} for a list of commands.", "help".bold());

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if let Some(monitor) = &monitor {
            poll_drift(monitor, &mut session);
        }
        print!("{} ", "twk>".cyan().bold());
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            println!();
            break;
        };
        if execute(&mut session, &line?) == Action::Quit {
            break;
        }
    }

    session.finish();
    Ok(())
}

fn poll_drift(monitor: &DriftMonitor, session: &mut Session) {
    if let Some(check) = monitor.poll() {
        session.absorb(&check);
        if !check.drift.is_empty() {
            print!("{}", output::drift_text(&check.drift));
        }
    }
}

fn execute(session: &mut Session, line: &str) -> Action {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Action::Continue;
    };
    let args: Vec<String> = words.map(str::to_string).collect();

    let batch = match command {
        "quit" | "exit" | "q" => return Action::Quit,
        "help" | "?" => {
            println!("{HELP}");
            return Action::Continue;
        }
        "status" | "ls" => {
            session.refresh();
            print!("{}", output::status_text(session.catalog(), args.first().map(String::as_str)));
            return Action::Continue;
        }
        "drift" => {
            print!("{}", output::drift_text(&session.detect_drift()));
            return Action::Continue;
        }
        "ledger" => {
            print!("{}", output::ledger_text(session.ledger()));
            return Action::Continue;
        }
        "restore-all" => {
            if session.ledger().is_empty() {
                println!("Nothing to restore.");
            } else {
                print!("{}", output::restore_text(&session.restore_all()));
            }
            return Action::Continue;
        }
        "apply" | "revert" if args.is_empty() => {
            println!("usage: {command} <id>...");
            return Action::Continue;
        }
        "apply-module" | "revert-module" if args.len() != 1 => {
            println!("usage: {command} <module>");
            return Action::Continue;
        }
        "apply" => session.apply(&args),
        "revert" => session.revert(&args),
        "apply-module" => session.apply_module(&args[0]),
        "revert-module" => session.revert_module(&args[0]),
        other => {
            println!("unknown command {other:?}; type help");
            return Action::Continue;
        }
    };

    match batch {
        Ok(report) => print!("{}", output::report_text(&report)),
        Err(e) => println!("{} {}", "✗".red().bold(), e),
    }
    Action::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use twk_engine::{Catalog, DriftDetector, StaticElevation};
    use twk_ledger::MutationLedger;
    use twk_store::{InMemoryValueStore, ValueStore};
    use twk_types::{Address, Module, MutationTarget, RootNamespace, Tweak, TweakStatus};

    fn session(store: Arc<InMemoryValueStore>, dir: &std::path::Path) -> Session {
        let addr = Address::new(RootNamespace::CurrentUser, "Software\\Demo", "a");
        let catalog = Catalog::new(vec![Module::new(
            "Demo",
            vec![Tweak::new("a", "A", vec![MutationTarget::integer(addr, 1, 0)])],
        )]);
        Session::new(
            catalog,
            store,
            MutationLedger::in_memory(),
            Arc::new(StaticElevation(true)),
            DriftDetector::new(dir.join("snapshot.dat")),
        )
    }

    #[test]
    fn commands_drive_the_session() {
        colored::control::set_override(false);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryValueStore::new());
        let mut s = session(store.clone(), dir.path());

        assert_eq!(execute(&mut s, "apply a"), Action::Continue);
        assert_eq!(s.catalog().tweak("a").unwrap().status, TweakStatus::Applied);
        assert_eq!(execute(&mut s, "revert-module Demo"), Action::Continue);
        assert!(store.read_raw(&s.ledger().entries()[0].address).unwrap().is_none());

        assert_eq!(execute(&mut s, "apply"), Action::Continue);
        assert_eq!(execute(&mut s, "bogus"), Action::Continue);
        assert_eq!(execute(&mut s, "   "), Action::Continue);
        assert_eq!(execute(&mut s, "quit"), Action::Quit);
    }

    #[test]
    fn drift_result_updates_statuses() {
        colored::control::set_override(false);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryValueStore::new());
        let mut s = session(store.clone(), dir.path());
        execute(&mut s, "apply a");
        s.finish();

        let addr = Address::new(RootNamespace::CurrentUser, "Software\\Demo", "a");
        store.write_integer(&addr, 0).unwrap();
        let monitor = s.spawn_drift_monitor().unwrap();
        while !monitor.is_finished() {
            std::thread::yield_now();
        }
        poll_drift(&monitor, &mut s);
        assert_eq!(s.catalog().tweak("a").unwrap().status, TweakStatus::NotApplied);
    }
}
