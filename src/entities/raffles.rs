use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::models::ElementCatalog;

/// 号码类型：数字区间 或 自定义列表（卡牌、字母等）
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    #[sea_orm(string_value = "numeric")]
    Numeric,
    #[sea_orm(string_value = "custom")]
    Custom,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementKind::Numeric => write!(f, "numeric"),
            ElementKind::Custom => write!(f, "custom"),
        }
    }
}

/// 抽奖活动实体
/// 说明:
/// - 号码目录 (catalog) 在创建后不可修改
/// - 已售/预留数量不落库，读取时从参与记录实时计算
/// - 不做物理删除，下线使用 is_active = false
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "raffles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub creator_id: i64,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub element_kind: ElementKind,
    pub element_count: i32,
    pub zero_padded: bool,
    /// 自定义号码列表 (JSON 字符串数组)，数字类型为 NULL
    pub custom_elements: Option<Json>,
    /// 单个号码价格（最小货币单位）
    pub price_cents: i64,
    pub currency: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    pub winning_element: Option<String>,
    pub result_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// 根据配置生成号码目录
    pub fn catalog(&self) -> AppResult<ElementCatalog> {
        match self.element_kind {
            ElementKind::Numeric => {
                let count = u32::try_from(self.element_count).map_err(|_| {
                    AppError::InternalError(format!(
                        "Raffle {} has invalid element_count {}",
                        self.id, self.element_count
                    ))
                })?;
                ElementCatalog::numeric(count, self.zero_padded)
            }
            ElementKind::Custom => {
                let labels: Vec<String> = match &self.custom_elements {
                    Some(value) => serde_json::from_value(value.clone())?,
                    None => Vec::new(),
                };
                ElementCatalog::custom(labels)
            }
        }
    }

    /// 当前是否接受参与
    pub fn ensure_open(&self, now: DateTime<Utc>) -> AppResult<()> {
        if !self.is_active {
            return Err(AppError::RaffleInactive("Raffle is not active".into()));
        }
        if self.result_published {
            return Err(AppError::RaffleInactive(
                "Raffle result has already been published".into(),
            ));
        }
        if let Some(starts_at) = self.starts_at
            && now < starts_at
        {
            return Err(AppError::RaffleInactive("Raffle has not started yet".into()));
        }
        if now >= self.ends_at {
            return Err(AppError::RaffleInactive("Raffle has ended".into()));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::participations::Entity")]
    Participations,
}

impl Related<super::participations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
