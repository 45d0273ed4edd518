use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{ElementKind, raffle_entity};

use super::{PaginatedResponse, ParticipationPublicResponse};

/// 创建抽奖活动
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateRaffleRequest {
    #[schema(example = "Sorteo de Navidad")]
    pub name: String,
    pub description: Option<String>,
    pub element_kind: ElementKind,
    /// 数字类型必填：号码数量
    #[schema(example = 100)]
    pub element_count: Option<u32>,
    /// 数字类型：是否按位数补零 ("001".."100")
    #[serde(default)]
    pub zero_padded: bool,
    /// 自定义类型必填：号码标签
    pub custom_elements: Option<Vec<String>>,
    /// 单价（最小货币单位）
    #[schema(example = 500)]
    pub price_cents: i64,
    /// 币种，默认使用系统配置
    #[schema(example = "eur")]
    pub currency: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: DateTime<Utc>,
}

/// 修改抽奖活动（号码目录不可修改）
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateRaffleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    /// 仅在尚无参与记录时允许修改
    pub price_cents: Option<i64>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// 活动列表查询参数
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct RaffleQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// 是否包含已下线活动 (默认 false)
    pub include_inactive: Option<bool>,
}

/// 号码分布统计（读取时实时计算）
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AllocationStats {
    pub total: usize,
    pub sold: usize,
    pub reserved: usize,
    pub available: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RaffleResponse {
    pub id: i64,
    pub creator_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub element_kind: ElementKind,
    pub element_count: i32,
    pub zero_padded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_elements: Option<Vec<String>>,
    pub price_cents: i64,
    pub currency: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    /// 当前是否可参与
    pub is_open: bool,
    pub winning_element: Option<String>,
    pub result_published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<AllocationStats>,
    pub created_at: DateTime<Utc>,
}

impl From<raffle_entity::Model> for RaffleResponse {
    fn from(m: raffle_entity::Model) -> Self {
        let is_open = m.ensure_open(Utc::now()).is_ok();
        let custom_elements = m
            .custom_elements
            .clone()
            .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok());
        RaffleResponse {
            id: m.id,
            creator_id: m.creator_id,
            name: m.name,
            description: m.description,
            element_kind: m.element_kind,
            element_count: m.element_count,
            zero_padded: m.zero_padded,
            custom_elements,
            price_cents: m.price_cents,
            currency: m.currency,
            starts_at: m.starts_at,
            ends_at: m.ends_at,
            is_active: m.is_active,
            is_open,
            winning_element: m.winning_element,
            result_published: m.result_published,
            stats: None,
            created_at: m.created_at,
        }
    }
}

impl RaffleResponse {
    pub fn with_stats(mut self, stats: AllocationStats) -> Self {
        self.stats = Some(stats);
        self
    }
}

/// 号码可用性
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailabilityResponse {
    pub raffle_id: i64,
    pub available: Vec<String>,
    pub reserved: Vec<String>,
    pub sold: Vec<String>,
    pub as_of: DateTime<Utc>,
}

/// 公布开奖结果
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PublishResultRequest {
    #[schema(example = "42")]
    pub winning_element: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RaffleResultResponse {
    pub raffle: RaffleResponse,
    pub winning_element: String,
    /// 中奖号码已售出时返回中奖参与记录
    pub winner: Option<ParticipationPublicResponse>,
}

pub type RafflePageResponse = PaginatedResponse<RaffleResponse>;
