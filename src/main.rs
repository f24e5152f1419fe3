// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use registration_reconciler::{Config, OutcomeTally, Session, CONFIG_FILE};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config = Config::load_or_default(Path::new(CONFIG_FILE))?;
    init_tracing(&config);

    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && args[1] == "import" {
        // Import mode
        run_import(config)?;
    } else {
        // UI mode (default)
        run_ui_mode(config)?;
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_import(config: Config) -> Result<()> {
    println!("📥 Registration Import - {} → {}", config.data_directory.display(), config.master_roster_path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Reference table + roster
    println!("\n📖 Loading reference table...");
    let output_directory = config.output_directory.clone();
    let mut session = Session::open(config)?;
    let status = session.status();
    match &status.reference_error {
        None => println!(
            "✓ {} entries ({} units)",
            status.reference_entries, status.reference_units
        ),
        Some(err) => println!("⚠️  Reference unavailable, units pass through unchanged: {}", err),
    }
    let reference_report = session.reference_report();
    if !reference_report.issues.is_empty() {
        println!("⚠️  {}", reference_report.summary());
        for issue in &reference_report.issues {
            println!("   [{:?}] row {}: {}", issue.severity, issue.row, issue.issue);
        }
    }
    println!("✓ Roster has {} registrants", status.roster_size);

    // 2. Stage every import file
    println!("\n📂 Reading registration exports...");
    let outcomes = session
        .import_directory()
        .with_context(|| format!("cannot read {}", session.config().data_directory.display()))?;

    if outcomes.is_empty() {
        println!("ℹ️  No {}*.csv files found", session.config().import_prefix);
        return Ok(());
    }
    let mut tally = OutcomeTally::default();
    for outcome in &outcomes {
        let mark = if outcome.is_ok() { "✓" } else { "❌" };
        println!("{} {}", mark, outcome.summary());
        if let Some(stats) = &outcome.stats {
            tally.merge(&stats.outcomes);
            if !stats.unmatched.is_empty() {
                println!("   ⚠️  Unmatched units: {}", stats.unmatched.join(", "));
            }
        }
    }
    println!("✓ {}", tally.summary());

    // 3. Merge
    println!("\n💾 Merging into roster...");
    if session.pending().is_empty() {
        println!("ℹ️  Nothing to merge");
    } else {
        let merged = session.commit()?;
        println!("✓ {}", merged.summary());
    }

    // 4. Reconcile
    println!("\n⚖️  Reconciling against reference list...");
    let report = session.report();
    for row in &report.rows {
        match row.count {
            Some(count) => println!("   {:<24} {:>4}", row.display_text, count),
            None => println!("【{}】", row.display_text),
        }
    }
    if let Some(unmatched) = session.unmatched() {
        if !unmatched.is_empty() {
            println!("\n⚠️  Units not in the reference list:");
            for unit in unmatched {
                println!("   {:<24} {:>4}", unit.unit, unit.count);
            }
        }
    }

    // 5. Report workbook
    println!("\n📊 Writing report...");
    let artifact = session.export_report()?;
    let path = artifact.write_to_dir(&output_directory)?;
    println!("✓ {}", path.display());

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ {}", report.summary());

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: Config) -> Result<()> {
    println!("🖥️  Loading Registration Reconciler UI...\n");

    let session = Session::open(config)?;
    println!("✓ Loaded {} registrants\n", session.roster().len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(session);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web page: cargo run --bin reconciler-server --features server");
    std::process::exit(1);
}
