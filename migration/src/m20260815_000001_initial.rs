use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Subscriptions {
    Table,
    Id,
    UserId,
    Plan,
    Status,
    CustomerKey,
    BillingKey,
    CardBrand,
    CardLast4,
    CurrentPeriodStart,
    CurrentPeriodEnd,
    TokensTotal,
    TokensUsed,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TokenTransactions {
    Table,
    Id,
    UserId,
    Amount,
    Reason,
    BalanceAfter,
    Description,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // enums
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("plan_id"))
                    .values(vec![
                        Alias::new("free"),
                        Alias::new("personal"),
                        Alias::new("heavy"),
                        Alias::new("enterprise"),
                    ])
                    .to_owned(),
            )
            .await?;
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("subscription_status"))
                    .values(vec![
                        Alias::new("active"),
                        Alias::new("cancelled"),
                        Alias::new("past_due"),
                    ])
                    .to_owned(),
            )
            .await?;
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("token_transaction_reason"))
                    .values(vec![
                        Alias::new("generation"),
                        Alias::new("purchase"),
                        Alias::new("renewal_grant"),
                        Alias::new("admin_adjustment"),
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Subscriptions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::Plan)
                            .custom(Alias::new("plan_id"))
                            .not_null()
                            .default(Expr::cust("'free'::plan_id")),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::Status)
                            .custom(Alias::new("subscription_status"))
                            .not_null()
                            .default(Expr::cust("'active'::subscription_status")),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CustomerKey)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::BillingKey)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CardBrand)
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CardLast4)
                            .string_len(8)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CurrentPeriodStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CurrentPeriodEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    // NULL = unlimited allowance (enterprise tier)
                    .col(
                        ColumnDef::new(Subscriptions::TokensTotal)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::TokensUsed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // one subscription per user; the upsert in ensure_subscription relies on this
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscriptions_user_unique")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // scheduler scan: status + due date
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscriptions_status_period_end")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::Status)
                    .col(Subscriptions::CurrentPeriodEnd)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TokenTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TokenTransactions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TokenTransactions::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TokenTransactions::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TokenTransactions::Reason)
                            .custom(Alias::new("token_transaction_reason"))
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TokenTransactions::BalanceAfter)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TokenTransactions::Description)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TokenTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_token_transactions_user_created")
                    .table(TokenTransactions::Table)
                    .col(TokenTransactions::UserId)
                    .col(TokenTransactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(TokenTransactions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(Subscriptions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_type(
                Type::drop()
                    .name(Alias::new("token_transaction_reason"))
                    .to_owned(),
            )
            .await?;
        manager
            .drop_type(
                Type::drop()
                    .name(Alias::new("subscription_status"))
                    .to_owned(),
            )
            .await?;
        manager
            .drop_type(Type::drop().name(Alias::new("plan_id")).to_owned())
            .await?;
        Ok(())
    }
}
