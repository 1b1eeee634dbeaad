use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_carts_table::Migration),
            Box::new(m20240101_000003_create_transactions_table::Migration),
            Box::new(m20240101_000004_create_payment_records_table::Migration),
        ]
    }
}

mod m20240101_000001_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::CategoryId).integer().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::Description)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(Products::Price).big_integer().not_null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_category_id")
                        .table(Products::Table)
                        .col(Products::CategoryId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        CategoryId,
        Name,
        Description,
        Price,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_carts_table {

    use sea_orm_migration::prelude::*;
    use sea_orm_migration::sea_orm::ConnectionTrait;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_carts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Carts::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Carts::UserId).integer().not_null())
                        .col(ColumnDef::new(Carts::ProductId).integer().not_null())
                        .col(
                            ColumnDef::new(Carts::TransactionId)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Carts::Quantity).integer().not_null())
                        .col(ColumnDef::new(Carts::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Carts::FinalPricePerItem)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Carts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_carts_user_status")
                        .table(Carts::Table)
                        .col(Carts::UserId)
                        .col(Carts::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_carts_transaction_id")
                        .table(Carts::Table)
                        .col(Carts::TransactionId)
                        .to_owned(),
                )
                .await?;

            // At most one open line per (user, product); checked out lines are exempt.
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS uq_carts_open_line \
                     ON carts (user_id, product_id) WHERE status = 'in_cart'",
                )
                .await
                .map(|_| ())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Carts {
        Table,
        Id,
        UserId,
        ProductId,
        TransactionId,
        Quantity,
        Status,
        FinalPricePerItem,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_transactions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Transactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Transactions::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Transactions::UserId).integer().not_null())
                        .col(ColumnDef::new(Transactions::AddressShip).text().not_null())
                        .col(
                            ColumnDef::new(Transactions::TotalPrice)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_user_id")
                        .table(Transactions::Table)
                        .col(Transactions::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Transactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Transactions {
        Table,
        Id,
        UserId,
        AddressShip,
        TotalPrice,
        CreatedAt,
    }
}

mod m20240101_000004_create_payment_records_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_payment_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentRecords::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::TransactionId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::GatewayTransactionId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentRecords::OrderId).string().not_null())
                        .col(
                            ColumnDef::new(PaymentRecords::PaymentType)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::PaymentData)
                                .text()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_payment_records_order_id")
                        .table(PaymentRecords::Table)
                        .col(PaymentRecords::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_records_transaction_id")
                        .table(PaymentRecords::Table)
                        .col(PaymentRecords::TransactionId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PaymentRecords {
        Table,
        Id,
        TransactionId,
        GatewayTransactionId,
        OrderId,
        PaymentType,
        Status,
        PaymentData,
        CreatedAt,
        UpdatedAt,
    }
}
