use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_products_table::Migration),
            Box::new(m20240301_000002_create_cart_items_table::Migration),
            Box::new(m20240301_000003_create_orders_table::Migration),
            Box::new(m20240301_000004_create_order_items_table::Migration),
            Box::new(m20240301_000005_create_withdraw_requests_table::Migration),
            Box::new(m20240415_000006_create_checkout_sessions_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_products_table"
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
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::InfluencerId).uuid().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        // Stock can never be driven below zero, even by a racing writer
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(Products::Stock).gte(0)),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_influencer_id")
                        .table(Products::Table)
                        .col(Products::InfluencerId)
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
    pub(super) enum Products {
        Table,
        Id,
        InfluencerId,
        Name,
        Description,
        Price,
        Stock,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_cart_items_table {

    use super::m20240301_000001_create_products_table::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_cart_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(CartItems::UserId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(CartItems::Quantity)
                                .integer()
                                .not_null()
                                .default(1)
                                .check(Expr::col(CartItems::Quantity).gte(1)),
                        )
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_product_id")
                                .from(CartItems::Table, CartItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One line per (user, product); add-to-cart bumps the quantity instead
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_cart_items_user_product")
                        .table(CartItems::Table)
                        .col(CartItems::UserId)
                        .col(CartItems::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        UserId,
        ProductId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Address).text().null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::CommissionPercentage)
                                .decimal_len(5, 2)
                                .not_null()
                                .default(10),
                        )
                        .col(
                            ColumnDef::new(Orders::CommissionAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::GatewayOrderId).string().null())
                        .col(ColumnDef::new(Orders::GatewayPaymentId).string().null())
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // A payment settles at most one order
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_orders_gateway_payment_id")
                        .table(Orders::Table)
                        .col(Orders::GatewayPaymentId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_created_at")
                        .table(Orders::Table)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        UserId,
        Address,
        TotalAmount,
        CommissionPercentage,
        CommissionAmount,
        Status,
        GatewayOrderId,
        GatewayPaymentId,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_order_items_table {

    use super::m20240301_000001_create_products_table::Products;
    use super::m20240301_000003_create_orders_table::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Quantity)
                                .integer()
                                .not_null()
                                .check(Expr::col(OrderItems::Quantity).gte(1)),
                        )
                        .col(
                            ColumnDef::new(OrderItems::Price)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_product_id")
                                .from(OrderItems::Table, OrderItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_product_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        Price,
        CreatedAt,
    }
}

mod m20240301_000005_create_withdraw_requests_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_withdraw_requests_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WithdrawRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WithdrawRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WithdrawRequests::InfluencerId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WithdrawRequests::Amount)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WithdrawRequests::Status)
                                .string()
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(WithdrawRequests::Reason).text().null())
                        .col(ColumnDef::new(WithdrawRequests::AdminNotes).text().null())
                        .col(
                            ColumnDef::new(WithdrawRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WithdrawRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WithdrawRequests::ProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_withdraw_requests_influencer_id")
                        .table(WithdrawRequests::Table)
                        .col(WithdrawRequests::InfluencerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WithdrawRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WithdrawRequests {
        Table,
        Id,
        InfluencerId,
        Amount,
        Status,
        Reason,
        AdminNotes,
        CreatedAt,
        UpdatedAt,
        ProcessedAt,
    }
}

mod m20240415_000006_create_checkout_sessions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240415_000006_create_checkout_sessions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CheckoutSessions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CheckoutSessions::GatewayOrderId)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CheckoutSessions::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(CheckoutSessions::Mode)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessions::AmountMinorUnits)
                                .big_integer()
                                .not_null()
                                .check(Expr::col(CheckoutSessions::AmountMinorUnits).gte(0)),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessions::Currency)
                                .string_len(3)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessions::CreatedAt)
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
                        .name("idx_checkout_sessions_user_id")
                        .table(CheckoutSessions::Table)
                        .col(CheckoutSessions::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CheckoutSessions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CheckoutSessions {
        Table,
        GatewayOrderId,
        UserId,
        Mode,
        AmountMinorUnits,
        Currency,
        CreatedAt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectionTrait, Database, DbBackend, Statement};

    #[tokio::test]
    async fn migrations_apply_on_sqlite_and_roll_back() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        for table in [
            "products",
            "cart_items",
            "orders",
            "order_items",
            "withdraw_requests",
            "checkout_sessions",
        ] {
            let row = db
                .query_one(Statement::from_sql_and_values(
                    DbBackend::Sqlite,
                    "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?",
                    [table.into()],
                ))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(row.try_get::<i64>("", "n").unwrap(), 1, "missing table {table}");
        }

        Migrator::down(&db, None).await.unwrap();
    }
}
