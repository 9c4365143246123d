//! Database connection utilities.

use sea_orm::{Database, DatabaseConnection, DbErr};

/// Configure SQLite-specific pragmas for concurrent sync runs.
///
/// WAL journal mode lets readers proceed while a bulk upsert is writing,
/// `busy_timeout=5000` waits out short lock contention instead of failing,
/// and NORMAL synchronous is safe under WAL.
async fn configure_sqlite(db: &DatabaseConnection) -> Result<(), DbErr> {
    use sea_orm::{ConnectionTrait, Statement};

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA journal_mode=WAL".to_string(),
    ))
    .await?;

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA busy_timeout=5000".to_string(),
    ))
    .await?;

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA synchronous=NORMAL".to_string(),
    ))
    .await?;

    Ok(())
}

/// Establish a connection to the mirror database.
///
/// SQLite connections get the pragma setup above; other backends connect
/// as-is.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;

    if database_url.starts_with("sqlite:") {
        configure_sqlite(&db).await?;
    }

    Ok(db)
}

/// Connect and bring the schema up to date.
///
/// The recommended entry point for applications: the sync orchestrators
/// assume all eight tables exist.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established or migrations
/// fail.
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = connect(database_url).await?;
    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}
