use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 参与记录所选号码（每个号码一行）
/// raffle_id 冗余存储，方便按活动查询号码归属
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "participation_elements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub participation_id: i64,
    pub raffle_id: i64,
    pub element: String,
    /// 提交时的顺序
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::participations::Entity",
        from = "Column::ParticipationId",
        to = "super::participations::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Participation,
}

impl Related<super::participations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
