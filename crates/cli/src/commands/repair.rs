use console::style;

use super::Context;

pub async fn mark_applied(context: &Context, id: &str) -> anyhow::Result<()> {
    let mut migrator = context.migrator().await?;
    migrator.mark_applied(id).await?;
    migrator.close().await?;

    println!("{} {} as applied (script not executed)", style("Marked").green().bold(), id);
    Ok(())
}

pub async fn mark_reverted(context: &Context, id: &str) -> anyhow::Result<()> {
    let mut migrator = context.migrator().await?;
    migrator.mark_reverted(id).await?;
    migrator.close().await?;

    println!("{} {} as reverted (script not executed)", style("Marked").green().bold(), id);
    Ok(())
}
