//! Initial migration creating the eight mirror tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_contacts(manager).await?;
        self.create_deals(manager).await?;
        self.create_tasks(manager).await?;
        self.create_events(manager).await?;
        self.create_messages(manager).await?;
        self.create_pipelines(manager).await?;
        self.create_task_types(manager).await?;
        self.create_users(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            Users::Table.into_table_ref(),
            TaskTypes::Table.into_table_ref(),
            Pipelines::Table.into_table_ref(),
            Messages::Table.into_table_ref(),
            Events::Table.into_table_ref(),
            Tasks::Table.into_table_ref(),
            Deals::Table.into_table_ref(),
            Contacts::Table.into_table_ref(),
        ] {
            manager.drop_table(Table::drop().table(table).to_owned()).await?;
        }
        Ok(())
    }
}

impl Migration {
    async fn create_contacts(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Contacts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Contacts::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Contacts::Name).string().not_null())
                    .col(
                        ColumnDef::new(Contacts::ResponsibleUserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Contacts::AccountId).big_integer().not_null())
                    .col(ColumnDef::new(Contacts::Leads).text().null())
                    .col(ColumnDef::new(Contacts::Companies).text().null())
                    .col(ColumnDef::new(Contacts::Tags).text().null())
                    .col(ColumnDef::new(Contacts::Raw).text().not_null())
                    .col(ColumnDef::new(Contacts::Fingerprint).string().not_null())
                    .col(
                        ColumnDef::new(Contacts::SourceUpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Contacts::SourceCreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Contacts::CheckedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // The incremental window derives from MAX(source_updated_at).
        manager
            .create_index(
                Index::create()
                    .name("idx_contacts_source_updated")
                    .table(Contacts::Table)
                    .col(Contacts::SourceUpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_deals(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Deals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Deals::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Deals::Name).string().not_null())
                    .col(ColumnDef::new(Deals::Price).big_integer().not_null())
                    .col(ColumnDef::new(Deals::StatusId).big_integer().not_null())
                    .col(ColumnDef::new(Deals::PipelineId).big_integer().not_null())
                    .col(ColumnDef::new(Deals::LossReasonId).big_integer().null())
                    .col(
                        ColumnDef::new(Deals::ResponsibleUserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Deals::AccountId).big_integer().not_null())
                    .col(ColumnDef::new(Deals::Contacts).text().null())
                    .col(ColumnDef::new(Deals::Companies).text().null())
                    .col(ColumnDef::new(Deals::Tags).text().null())
                    .col(ColumnDef::new(Deals::Raw).text().not_null())
                    .col(ColumnDef::new(Deals::Fingerprint).string().not_null())
                    .col(
                        ColumnDef::new(Deals::SourceUpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Deals::SourceCreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Deals::CheckedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_deals_source_updated")
                    .table(Deals::Table)
                    .col(Deals::SourceUpdatedAt)
                    .to_owned(),
            )
            .await?;

        // Pipeline placement queries filter on (pipeline_id, status_id).
        manager
            .create_index(
                Index::create()
                    .name("idx_deals_pipeline_status")
                    .table(Deals::Table)
                    .col(Deals::PipelineId)
                    .col(Deals::StatusId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_tasks(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tasks::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tasks::Text).text().not_null())
                    .col(ColumnDef::new(Tasks::TaskTypeId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Tasks::IsCompleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Tasks::CompleteTill)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Tasks::ResultText).text().null())
                    .col(
                        ColumnDef::new(Tasks::ResponsibleUserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Tasks::AccountId).big_integer().not_null())
                    .col(ColumnDef::new(Tasks::Leads).text().null())
                    .col(ColumnDef::new(Tasks::Companies).text().null())
                    .col(ColumnDef::new(Tasks::Contacts).text().null())
                    .col(ColumnDef::new(Tasks::Raw).text().not_null())
                    .col(ColumnDef::new(Tasks::Fingerprint).string().not_null())
                    .col(
                        ColumnDef::new(Tasks::SourceUpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tasks::SourceCreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tasks::CheckedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_source_updated")
                    .table(Tasks::Table)
                    .col(Tasks::SourceUpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_events(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Events::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Events::EventType).string().not_null())
                    .col(ColumnDef::new(Events::EntityId).big_integer().not_null())
                    .col(ColumnDef::new(Events::EntityType).string().not_null())
                    .col(ColumnDef::new(Events::CreatedBy).big_integer().not_null())
                    .col(ColumnDef::new(Events::ValueBefore).text().null())
                    .col(ColumnDef::new(Events::ValueAfter).text().null())
                    .col(ColumnDef::new(Events::Raw).text().not_null())
                    .col(ColumnDef::new(Events::Fingerprint).string().not_null())
                    .col(
                        ColumnDef::new(Events::EventAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Events::CheckedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_event_at")
                    .table(Events::Table)
                    .col(Events::EventAt)
                    .to_owned(),
            )
            .await?;

        // Per-record history lookups.
        manager
            .create_index(
                Index::create()
                    .name("idx_events_entity")
                    .table(Events::Table)
                    .col(Events::EntityType)
                    .col(Events::EntityId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_messages(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Messages::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Messages::EventType).string().not_null())
                    .col(ColumnDef::new(Messages::EntityId).big_integer().not_null())
                    .col(ColumnDef::new(Messages::ChatId).big_integer().not_null())
                    .col(ColumnDef::new(Messages::AuthorId).big_integer().not_null())
                    .col(ColumnDef::new(Messages::Text).text().not_null())
                    .col(ColumnDef::new(Messages::Raw).text().not_null())
                    .col(ColumnDef::new(Messages::Fingerprint).string().not_null())
                    .col(
                        ColumnDef::new(Messages::EventAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Messages::CheckedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_messages_event_at")
                    .table(Messages::Table)
                    .col(Messages::EventAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_messages_entity")
                    .table(Messages::Table)
                    .col(Messages::EntityId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_pipelines(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Pipelines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Pipelines::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Pipelines::Name).string().not_null())
                    .col(ColumnDef::new(Pipelines::Sort).integer().not_null())
                    .col(
                        ColumnDef::new(Pipelines::IsMain)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Pipelines::Statuses).text().null())
                    .col(ColumnDef::new(Pipelines::Raw).text().not_null())
                    .col(ColumnDef::new(Pipelines::Fingerprint).string().not_null())
                    .col(
                        ColumnDef::new(Pipelines::CheckedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_task_types(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TaskTypes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskTypes::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaskTypes::Name).string().not_null())
                    .col(ColumnDef::new(TaskTypes::Color).string().not_null())
                    .col(ColumnDef::new(TaskTypes::IconId).big_integer().not_null())
                    .col(ColumnDef::new(TaskTypes::Raw).text().not_null())
                    .col(ColumnDef::new(TaskTypes::Fingerprint).string().not_null())
                    .col(
                        ColumnDef::new(TaskTypes::CheckedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_users(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::Email).string().not_null())
                    .col(ColumnDef::new(Users::Raw).text().not_null())
                    .col(ColumnDef::new(Users::Fingerprint).string().not_null())
                    .col(
                        ColumnDef::new(Users::CheckedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "contacts")]
enum Contacts {
    Table,
    Id,
    Name,
    ResponsibleUserId,
    AccountId,
    Leads,
    Companies,
    Tags,
    Raw,
    Fingerprint,
    SourceUpdatedAt,
    SourceCreatedAt,
    CheckedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "deals")]
enum Deals {
    Table,
    Id,
    Name,
    Price,
    StatusId,
    PipelineId,
    LossReasonId,
    ResponsibleUserId,
    AccountId,
    Contacts,
    Companies,
    Tags,
    Raw,
    Fingerprint,
    SourceUpdatedAt,
    SourceCreatedAt,
    CheckedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "tasks")]
enum Tasks {
    Table,
    Id,
    Text,
    TaskTypeId,
    IsCompleted,
    CompleteTill,
    ResultText,
    ResponsibleUserId,
    AccountId,
    Leads,
    Companies,
    Contacts,
    Raw,
    Fingerprint,
    SourceUpdatedAt,
    SourceCreatedAt,
    CheckedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "events")]
enum Events {
    Table,
    Id,
    EventType,
    EntityId,
    EntityType,
    CreatedBy,
    ValueBefore,
    ValueAfter,
    Raw,
    Fingerprint,
    EventAt,
    CheckedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "messages")]
enum Messages {
    Table,
    Id,
    EventType,
    EntityId,
    ChatId,
    AuthorId,
    Text,
    Raw,
    Fingerprint,
    EventAt,
    CheckedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "pipelines")]
enum Pipelines {
    Table,
    Id,
    Name,
    Sort,
    IsMain,
    Statuses,
    Raw,
    Fingerprint,
    CheckedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "task_types")]
enum TaskTypes {
    Table,
    Id,
    Name,
    Color,
    IconId,
    Raw,
    Fingerprint,
    CheckedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "users")]
enum Users {
    Table,
    Id,
    Name,
    Email,
    Raw,
    Fingerprint,
    CheckedAt,
}
