use console::style;
use elif_migrate::migrator::create_migration;
use elif_migrate::{BatchReport, Direction, MigrateResult, MigrationError, Scanner};

use super::Context;
use crate::ListKind;

pub async fn up(context: &Context, limit: Option<usize>) -> anyhow::Result<()> {
    let mut migrator = context.migrator().await?;
    let result = migrator.up(limit).await;
    migrator.close().await?;
    report(result)
}

pub async fn down(context: &Context, limit: Option<usize>) -> anyhow::Result<()> {
    let mut migrator = context.migrator().await?;
    let result = migrator.down(limit).await;
    migrator.close().await?;
    report(result)
}

pub async fn reset(context: &Context) -> anyhow::Result<()> {
    let mut migrator = context.migrator().await?;
    let result = migrator.reset().await;
    migrator.close().await?;
    report(result)
}

fn report(result: MigrateResult<BatchReport>) -> anyhow::Result<()> {
    match result {
        Ok(report) => {
            print_summary(&report);
            Ok(())
        }
        Err(err) => {
            if let Some(partial) = err.partial_report() {
                print_summary(partial);
            }
            if let MigrationError::Halted {
                failed, direction, ..
            } = &err
            {
                if err.needs_repair() {
                    let repair = match direction {
                        Direction::Up => "mark-applied",
                        Direction::Down => "mark-reverted",
                    };
                    eprintln!(
                        "{} the {} script of {} ran but the ledger was not updated; \
                         after checking the schema, run `elif-migrate repair {} {}`",
                        style("!").red().bold(),
                        direction,
                        failed,
                        repair,
                        failed
                    );
                }
            }
            Err(err.into())
        }
    }
}

fn print_summary(report: &BatchReport) {
    let verb = match report.direction {
        Direction::Up => "Applied",
        Direction::Down => "Rolled back",
    };

    if report.is_empty() && !report.cancelled {
        println!("{}", style("Nothing to do").dim());
        return;
    }

    println!(
        "{} {} migration(s), {} row(s) affected",
        style(verb).green().bold(),
        report.count(),
        report.affected_rows
    );
    if !report.skipped.is_empty() {
        println!(
            "{} {} migration(s) with empty scripts: {}",
            style("Skipped").yellow(),
            report.skipped.len(),
            report.skipped.join(", ")
        );
    }
    if report.cancelled {
        println!("{}", style("Cancelled before finishing the batch").yellow());
    }
}

/// Filesystem only; the database does not have to exist yet
pub fn create(context: &Context, name: &str) -> anyhow::Result<()> {
    let created = create_migration(&context.config, &context.database, name)?;

    println!("{} {}", style("Created migration").green().bold(), created.id);
    println!("  {}", created.up.display());
    println!("  {}", created.down.display());
    Ok(())
}

pub async fn list(context: &Context, kind: ListKind, json: bool) -> anyhow::Result<()> {
    match kind {
        // Reads the migrations directory only
        ListKind::All => {
            let scanner = Scanner::new(context.config.migrations_directory(&context.database)?);
            print_ids(scanner.list_all()?, json)
        }
        ListKind::Pending => {
            let mut migrator = context.migrator().await?;
            let pending = migrator.list_pending().await?;
            migrator.close().await?;
            print_ids(pending, json)
        }
        ListKind::Ran => {
            let mut migrator = context.migrator().await?;
            let ran = migrator.list_ran().await?;
            migrator.close().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&ran)?);
            } else if ran.is_empty() {
                println!("{}", style("No migrations have run").dim());
            } else {
                for entry in ran {
                    println!("{}  {}", entry.migration, style(entry.ran_at).dim());
                }
            }
            Ok(())
        }
    }
}

fn print_ids(ids: Vec<String>, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
    } else if ids.is_empty() {
        println!("{}", style("No migrations").dim());
    } else {
        for id in ids {
            println!("{}", id);
        }
    }
    Ok(())
}

pub async fn status(context: &Context, json: bool) -> anyhow::Result<()> {
    let mut migrator = context.migrator().await?;
    let status = migrator.status().await?;
    migrator.close().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!(
        "{} {} ({} ran, {} pending)",
        style("Migration status for").bold(),
        style(&context.database).cyan(),
        status.ran_count(),
        status.pending_count()
    );
    for entry in &status.entries {
        match entry.ran_at {
            Some(ran_at) => println!("  {} {}  {}", style("ran    ").green(), entry.id, style(ran_at).dim()),
            None => println!("  {} {}", style("pending").yellow(), entry.id),
        }
    }
    for orphan in &status.orphans {
        println!(
            "  {} {}  {}",
            style("missing").red(),
            orphan.migration,
            style("recorded in the ledger but not found on disk").dim()
        );
    }
    Ok(())
}

pub async fn last(context: &Context) -> anyhow::Result<()> {
    let mut migrator = context.migrator().await?;
    let last = migrator.last().await?;
    migrator.close().await?;

    match last {
        Some(id) => println!("{}", id),
        None => println!("{}", style("No migrations have run").dim()),
    }
    Ok(())
}

pub async fn next(context: &Context) -> anyhow::Result<()> {
    let mut migrator = context.migrator().await?;
    let next = migrator.next().await?;
    migrator.close().await?;

    println!("{}", next);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use elif_migrate::{DatabaseConfig, MigrateConfig};

    fn fresh_sqlite_project(dir: &std::path::Path) -> Context {
        Context {
            config: MigrateConfig::new(dir).with_database("app", DatabaseConfig::sqlite("var/app.sqlite")),
            database: "app".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_all_before_db_setup() {
        let dir = tempfile::tempdir().unwrap();
        let context = fresh_sqlite_project(dir.path());

        create(&context, "init").unwrap();
        list(&context, ListKind::All, true).await.unwrap();

        let root = dir.path().join("database/migrations/sqlite/app");
        let ids: Vec<_> = std::fs::read_dir(&root).unwrap().collect();
        assert_eq!(ids.len(), 1);
        assert!(!dir.path().join("var/app.sqlite").exists());
    }

    #[tokio::test]
    async fn test_list_pending_needs_database() {
        let dir = tempfile::tempdir().unwrap();
        let context = fresh_sqlite_project(dir.path());
        std::fs::create_dir_all(dir.path().join("database/migrations/sqlite/app")).unwrap();

        assert!(list(&context, ListKind::Pending, false).await.is_err());
    }
}
