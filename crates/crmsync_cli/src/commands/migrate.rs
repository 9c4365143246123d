//! Database migration commands.

use crmsync::migration::Migrator;
use sea_orm_migration::MigratorTrait;

use crate::config::Config;
use crate::MigrateAction;

pub(crate) async fn handle_migrate(
    action: MigrateAction,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let database_url = config
        .database_url()
        .ok_or("could not determine database location")?;
    let db = crmsync::connect(&database_url).await?;

    match action {
        MigrateAction::Up => {
            println!("Running migrations...");
            Migrator::up(&db, None).await?;
            println!("Migrations applied successfully.");
        }
        MigrateAction::Down => {
            println!("Rolling back last migration...");
            Migrator::down(&db, Some(1)).await?;
            println!("Rollback complete.");
        }
        MigrateAction::Status => {
            let applied = Migrator::get_applied_migrations(&db).await?;
            let pending = Migrator::get_pending_migrations(&db).await?;
            println!("Applied migrations:");
            if applied.is_empty() {
                println!("  (none)");
            }
            for migration in &applied {
                println!("  {}", migration.name());
            }
            println!("Pending migrations:");
            if pending.is_empty() {
                println!("  (none)");
            }
            for migration in &pending {
                println!("  {}", migration.name());
            }
        }
        MigrateAction::Fresh => {
            println!("Dropping all tables and reapplying migrations...");
            Migrator::fresh(&db).await?;
            println!("Fresh install complete.");
        }
    }

    Ok(())
}
