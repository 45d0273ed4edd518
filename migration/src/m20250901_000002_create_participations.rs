use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Raffles {
    Table,
    Id,
}

/// 参与记录（台账）
#[derive(DeriveIden)]
enum Participations {
    Table,
    Id,
    Reference,
    RaffleId,
    ParticipantName,
    ParticipantEmail,
    ParticipantPhone,
    TotalCents,
    Currency,
    Status,
    StatusReason,
    StatusNote,
    PaymentIntentId,
    PaidCents,
    CreatedAt,
    DecidedAt,
    UpdatedAt,
}

/// 参与记录选中的号码
#[derive(DeriveIden)]
enum ParticipationElements {
    Table,
    Id,
    ParticipationId,
    RaffleId,
    Element,
    Position,
}

/// 已处理的支付事件，event_ref 用于去重
#[derive(DeriveIden)]
enum PaymentEvents {
    Table,
    Id,
    EventRef,
    PaymentIntentId,
    ParticipationId,
    Outcome,
    AmountCents,
    Result,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Participations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Participations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Participations::Reference)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Participations::RaffleId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Participations::ParticipantName)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Participations::ParticipantEmail)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Participations::ParticipantPhone)
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Participations::TotalCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Participations::Currency)
                            .string_len(3)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Participations::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Participations::StatusReason)
                            .string_len(16)
                            .null(),
                    )
                    .col(ColumnDef::new(Participations::StatusNote).text().null())
                    .col(
                        ColumnDef::new(Participations::PaymentIntentId)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Participations::PaidCents)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Participations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Participations::DecidedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Participations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participations_raffle")
                            .from(Participations::Table, Participations::RaffleId)
                            .to(Raffles::Table, Raffles::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_participations_reference_unique")
                    .table(Participations::Table)
                    .col(Participations::Reference)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // NULL 不参与唯一约束，可多条未绑定支付意图的记录
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_participations_payment_intent_unique")
                    .table(Participations::Table)
                    .col(Participations::PaymentIntentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_participations_raffle_status")
                    .table(Participations::Table)
                    .col(Participations::RaffleId)
                    .col(Participations::Status)
                    .to_owned(),
            )
            .await?;

        // 号码不设唯一约束：被拒绝 / 过期的记录释放后号码可再次被选
        manager
            .create_table(
                Table::create()
                    .table(ParticipationElements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ParticipationElements::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ParticipationElements::ParticipationId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipationElements::RaffleId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipationElements::Element)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipationElements::Position)
                            .integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participation_elements_participation")
                            .from(
                                ParticipationElements::Table,
                                ParticipationElements::ParticipationId,
                            )
                            .to(Participations::Table, Participations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_participation_elements_raffle_element")
                    .table(ParticipationElements::Table)
                    .col(ParticipationElements::RaffleId)
                    .col(ParticipationElements::Element)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_participation_elements_participation")
                    .table(ParticipationElements::Table)
                    .col(ParticipationElements::ParticipationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PaymentEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PaymentEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PaymentEvents::EventRef)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentEvents::PaymentIntentId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentEvents::ParticipationId)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PaymentEvents::Outcome)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentEvents::AmountCents)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PaymentEvents::Result)
                            .string_len(24)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_payment_events_event_ref_unique")
                    .table(PaymentEvents::Table)
                    .col(PaymentEvents::EventRef)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_payment_events_intent")
                    .table(PaymentEvents::Table)
                    .col(PaymentEvents::PaymentIntentId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 删除顺序：事件 -> 号码 -> 参与记录
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(PaymentEvents::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(ParticipationElements::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(Participations::Table)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
