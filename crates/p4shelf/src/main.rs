use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use p4shelf_lib::cli::commands::{Cli, Commands};
use p4shelf_lib::migrate::{self, MigrateOptions};
use p4shelf_lib::shelf::{self, naming, BuildOptions, RestoreReport, ZipStore};
use p4shelf_lib::{reconcile, revert, P4Cli, Session, Settings};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the command line
    env_logger::init_from_env(Env::default().filter_or("RUST_LOG", cli.log_filter()));

    let settings = Settings::load().with_context(|| "Failed to load settings")?;
    let config = cli.config_with(&settings);
    if config.dry_run {
        info!("Dry run: nothing will be changed (give -y to do the work)");
    }

    let p4 = P4Cli::new(config.connection.clone());
    let session = Session::new(&p4, config);

    match cli.command {
        Commands::Shelve {
            file,
            change,
            comment,
            exact,
            overwrite,
            relative,
        } => {
            let options = BuildOptions {
                change,
                comment,
                overwrite,
                relative_paths: relative,
            };
            cmd_shelve(&session, &settings, &file, exact, &options)?;
        }
        Commands::Unshelve { file, head } => {
            cmd_unshelve(&session, &file, head)?;
        }
        Commands::Revert { change } => {
            cmd_revert(&session, change)?;
        }
        Commands::Migrate {
            client,
            new_location,
            switch_only,
            archive,
        } => {
            let options = MigrateOptions {
                client,
                new_location,
                branch: !switch_only,
                archive,
            };
            cmd_migrate(&session, &options)?;
        }
        Commands::Reconcile { directory } => {
            let directory = match directory {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            cmd_reconcile(&session, &directory)?;
        }
    }

    Ok(())
}

/// Archive the opened files
fn cmd_shelve(
    session: &Session<'_>,
    settings: &Settings,
    file: &Path,
    exact: bool,
    options: &BuildOptions,
) -> Result<()> {
    let base = settings.archive_path(file);
    let target: PathBuf = if exact {
        base
    } else {
        let now = chrono::Local::now().naive_local();
        naming::derive_target_name(&base, now, options.comment.as_deref())
    };

    let summary = shelf::build(session, &target, options)
        .with_context(|| format!("Failed to shelve to {}", target.display()))?;

    if session.is_dry_run() {
        println!("Would write {}:", summary.target.display());
        println!();
        print!("{}", summary.document);
    } else {
        println!(
            "✓ Shelved {} file(s) to {}",
            summary.description.files.len(),
            summary.target.display()
        );
    }
    Ok(())
}

/// Restore an archive onto the workspace
fn cmd_unshelve(session: &Session<'_>, file: &Path, head: bool) -> Result<()> {
    let mut store = ZipStore::open(file)
        .with_context(|| format!("Failed to open archive {}", file.display()))?;

    let session = if head {
        session.with_sync_head()
    } else {
        session.clone()
    };
    let report = shelf::restore(&session, &mut store)
        .with_context(|| format!("Failed to restore {}", file.display()))?;

    print_restore_report(&report, session.is_dry_run());
    if !report.failures.is_empty() {
        return Err(anyhow::anyhow!(
            "{} file(s) could not be restored",
            report.failures.len()
        ));
    }
    Ok(())
}

fn print_restore_report(report: &RestoreReport, dry_run: bool) {
    if dry_run {
        println!("Would run:");
        for step in &report.steps {
            println!("  {}", step);
        }
    }
    for ambiguity in &report.ambiguous {
        println!("! {}", ambiguity);
    }
    for failure in &report.failures {
        println!("✗ {}: {}", failure.path, failure.error);
    }
}

/// Open the inverse of a submitted change
fn cmd_revert(session: &Session<'_>, change: u32) -> Result<()> {
    let report = revert::revert_change(session, change)
        .with_context(|| format!("Failed to revert change {}", change))?;

    if session.is_dry_run() {
        println!("Would run:");
        for step in &report.steps {
            println!("  p4 {}", step);
        }
    }
    for ambiguity in &report.ambiguous {
        println!("! {}", ambiguity);
    }
    for path in &report.pending_resolve {
        println!("  needs resolve: {}", path);
    }
    for failure in &report.failures {
        println!("✗ {}: {}", failure.path, failure.error);
    }

    if !report.failures.is_empty() {
        return Err(anyhow::anyhow!(
            "{} file(s) could not be reverted",
            report.failures.len()
        ));
    }
    println!("✓ Opened the inverse of change {}; review and submit it", change);
    Ok(())
}

/// Move a workspace to a new depot location
fn cmd_migrate(session: &Session<'_>, options: &MigrateOptions) -> Result<()> {
    let report = migrate::migrate(session, options).with_context(|| {
        format!(
            "Failed to migrate {} to {}",
            options.client, options.new_location
        )
    })?;

    println!("  Old workspace kept at {}", report.backup_dir.display());
    println!("  Work in progress archived at {}", report.archive.display());
    match &report.restored {
        Some(restored) => {
            print_restore_report(restored, false);
            if !restored.failures.is_empty() {
                warn!(
                    "Some files were not restored; the archive {} still has them",
                    report.archive.display()
                );
            }
        }
        None => println!("Dry run finished; nothing was moved"),
    }
    Ok(())
}

/// Catch the server up with offline work
fn cmd_reconcile(session: &Session<'_>, directory: &Path) -> Result<()> {
    let report = reconcile::reconcile(session, directory)
        .with_context(|| format!("Failed to reconcile {}", directory.display()))?;

    let verb = if session.is_dry_run() { "Would open" } else { "Opened" };
    for path in &report.deleted {
        println!("{} for delete: {}", verb, path);
    }
    for path in &report.edited {
        println!("{} for edit: {}", verb, path);
    }
    print!("{}", report.add_output);
    Ok(())
}
