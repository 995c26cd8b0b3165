use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_catalog_tables::Migration),
            Box::new(m20240101_000002_create_voucher_table::Migration),
            Box::new(m20240101_000003_create_cart_tables::Migration),
            Box::new(m20240101_000004_create_order_tables::Migration),
            Box::new(m20240101_000005_create_coin_transactions_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Read models owned by collaborator services (profile, catalog,
            // address book); this core only reads them, except for stock.
            manager
                .create_table(
                    Table::create()
                        .table(Sellers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Sellers::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Sellers::StoreName).string().not_null())
                        .col(ColumnDef::new(Sellers::Email).string().not_null())
                        .col(
                            ColumnDef::new(Sellers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Products::SellerId).uuid().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::PriceSale).decimal_len(16, 2))
                        .col(ColumnDef::new(Products::Stock).integer().not_null())
                        .col(ColumnDef::new(Products::WeightGrams).integer().not_null())
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
                        .name("idx_products_seller_id")
                        .table(Products::Table)
                        .col(Products::SellerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Addresses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Addresses::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Addresses::UserId).uuid().not_null())
                        .col(ColumnDef::new(Addresses::Label).string().not_null())
                        .col(ColumnDef::new(Addresses::Recipient).string().not_null())
                        .col(ColumnDef::new(Addresses::Phone).string().not_null())
                        .col(ColumnDef::new(Addresses::Detail).string().not_null())
                        .col(ColumnDef::new(Addresses::AreaCode).string().not_null())
                        .col(
                            ColumnDef::new(Addresses::IsDefault)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Addresses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_addresses_user_id")
                        .table(Addresses::Table)
                        .col(Addresses::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Addresses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Sellers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Sellers {
        Table,
        Id,
        StoreName,
        Email,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        SellerId,
        Name,
        Price,
        PriceSale,
        Stock,
        WeightGrams,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Addresses {
        Table,
        Id,
        UserId,
        Label,
        Recipient,
        Phone,
        Detail,
        AreaCode,
        IsDefault,
        CreatedAt,
    }
}

mod m20240101_000002_create_voucher_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_voucher_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Vouchers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Vouchers::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Vouchers::Code).string().not_null())
                        .col(ColumnDef::new(Vouchers::Name).string().not_null())
                        .col(ColumnDef::new(Vouchers::SellerId).uuid())
                        .col(ColumnDef::new(Vouchers::Kind).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Vouchers::ValueType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vouchers::Value)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Vouchers::MaxAmount).decimal_len(16, 2))
                        .col(
                            ColumnDef::new(Vouchers::StartsAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vouchers::EndsAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vouchers::IsPublic)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("uq_vouchers_code")
                        .table(Vouchers::Table)
                        .col(Vouchers::Code)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Vouchers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Vouchers {
        Table,
        Id,
        Code,
        Name,
        SellerId,
        Kind,
        ValueType,
        Value,
        MaxAmount,
        StartsAt,
        EndsAt,
        IsPublic,
    }
}

mod m20240101_000003_create_cart_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_cart_tables"
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
                        .col(ColumnDef::new(Carts::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Carts::BuyerId).uuid().not_null())
                        .col(ColumnDef::new(Carts::AddressId).uuid())
                        .col(ColumnDef::new(Carts::Courier).string_len(20))
                        .col(ColumnDef::new(Carts::CourierService).string())
                        .col(ColumnDef::new(Carts::CourierEta).string())
                        .col(
                            ColumnDef::new(Carts::CourierPrice)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Carts::VoucherId).uuid())
                        .col(
                            ColumnDef::new(Carts::VoucherDiscount)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::VoucherCashback)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::ServiceFee)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::UseCoin)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Carts::CoinApplied)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Carts::Total).decimal_len(16, 2).not_null())
                        .col(
                            ColumnDef::new(Carts::TotalPayment)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Carts::PaymentMethod).string_len(20))
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

            // One active cart per buyer.
            manager
                .create_index(
                    Index::create()
                        .name("uq_carts_buyer_id")
                        .table(Carts::Table)
                        .col(Carts::BuyerId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Variations).json())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(CartItems::Note).string())
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_cart_items_cart_id")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Carts {
        Table,
        Id,
        BuyerId,
        AddressId,
        Courier,
        CourierService,
        CourierEta,
        CourierPrice,
        VoucherId,
        VoucherDiscount,
        VoucherCashback,
        ServiceFee,
        UseCoin,
        CoinApplied,
        Total,
        TotalPayment,
        PaymentMethod,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        ProductId,
        Variations,
        Quantity,
        Note,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_order_tables"
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
                        .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Orders::InvoiceNumber).string().not_null())
                        .col(ColumnDef::new(Orders::BuyerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::SellerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::AddressId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Courier).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::CourierService).string().not_null())
                        .col(ColumnDef::new(Orders::CourierEta).string())
                        .col(
                            ColumnDef::new(Orders::CourierPrice)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::VoucherId).uuid())
                        .col(
                            ColumnDef::new(Orders::VoucherDiscount)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::VoucherCashback)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::ServiceFee)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CoinApplied)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::Total).decimal_len(16, 2).not_null())
                        .col(
                            ColumnDef::new(Orders::TotalPayment)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::PaymentMethod)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::PaymentReference).string())
                        .col(ColumnDef::new(Orders::PaymentExpiresAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(Orders::IsPaid)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("uq_orders_invoice_number")
                        .table(Orders::Table)
                        .col(Orders::InvoiceNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_buyer_id")
                        .table(Orders::Table)
                        .col(Orders::BuyerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Variations).json())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::Note).string())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            // Append-only status log; current status is the latest row.
            manager
                .create_table(
                    Table::create()
                        .table(OrderStatuses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderStatuses::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderStatuses::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderStatuses::Status)
                                .string_len(30)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderStatuses::Description).string().not_null())
                        .col(
                            ColumnDef::new(OrderStatuses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_statuses_order_id")
                        .table(OrderStatuses::Table)
                        .col(OrderStatuses::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderStatuses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        InvoiceNumber,
        BuyerId,
        SellerId,
        AddressId,
        Courier,
        CourierService,
        CourierEta,
        CourierPrice,
        VoucherId,
        VoucherDiscount,
        VoucherCashback,
        ServiceFee,
        CoinApplied,
        Total,
        TotalPayment,
        PaymentMethod,
        PaymentReference,
        PaymentExpiresAt,
        IsPaid,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Variations,
        Quantity,
        Note,
    }

    #[derive(DeriveIden)]
    enum OrderStatuses {
        Table,
        Id,
        OrderId,
        Status,
        Description,
        CreatedAt,
    }
}

mod m20240101_000005_create_coin_transactions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_coin_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CoinTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CoinTransactions::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CoinTransactions::BuyerId).uuid().not_null())
                        .col(
                            ColumnDef::new(CoinTransactions::Amount)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CoinTransactions::Description)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CoinTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_coin_transactions_buyer_id")
                        .table(CoinTransactions::Table)
                        .col(CoinTransactions::BuyerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CoinTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CoinTransactions {
        Table,
        Id,
        BuyerId,
        Amount,
        Description,
        CreatedAt,
    }
}
