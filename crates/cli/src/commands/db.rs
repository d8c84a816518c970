use console::style;

use super::Context;

pub async fn setup(context: &Context) -> anyhow::Result<()> {
    let driver = context.driver()?;
    let created = driver.setup().await?;

    if created {
        println!(
            "{} {} database '{}' with its migration ledger",
            style("Created").green().bold(),
            driver.dialect(),
            driver.database()
        );
    } else {
        println!(
            "Database '{}' already exists; migration ledger is in place",
            driver.database()
        );
    }
    Ok(())
}

pub async fn drop(context: &Context) -> anyhow::Result<()> {
    let driver = context.driver()?;

    if driver.drop_database().await? {
        println!(
            "{} {} database '{}'",
            style("Dropped").red().bold(),
            driver.dialect(),
            driver.database()
        );
    } else {
        println!("Database '{}' does not exist", driver.database());
    }
    Ok(())
}

pub async fn exists(context: &Context) -> anyhow::Result<()> {
    let driver = context.driver()?;

    if driver.exists().await? {
        println!("{} '{}' exists", style("✓").green(), driver.database());
        Ok(())
    } else {
        anyhow::bail!("Database '{}' does not exist", driver.database())
    }
}
