//! 号码分配计算
//!
//! sold / reserved / available 不落库，每次从参与记录实时推导：
//! - sold: confirmed 记录的号码
//! - reserved: 仍在保留期内的 pending 记录的号码
//! - available: 目录 - sold - reserved
//!
//! 过期的 pending 记录在这里直接视为已释放，后台任务再将其标记为 rejected。

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::collections::{HashMap, HashSet};

use crate::entities::{
    ParticipationStatus, participation_element_entity as elements, participation_entity as participations,
    raffle_entity as raffles,
};
use crate::error::{AppError, AppResult};
use crate::models::{AllocationStats, AvailabilityResponse, ElementCatalog};

/// 账本中一条参与记录及其号码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub participation_id: i64,
    pub status: ParticipationStatus,
    pub created_at: DateTime<Utc>,
    pub elements: Vec<String>,
}

impl LedgerEntry {
    /// confirmed，或未过期的 pending
    pub fn is_live(&self, now: DateTime<Utc>, hold: Duration) -> bool {
        match self.status {
            ParticipationStatus::Confirmed => true,
            ParticipationStatus::Pending => self.created_at + hold > now,
            ParticipationStatus::Rejected => false,
        }
    }
}

/// 某一时刻的号码分布，各列表按目录顺序排列
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    pub sold: Vec<String>,
    pub reserved: Vec<String>,
    pub available: Vec<String>,
}

impl Allocation {
    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            total: self.sold.len() + self.reserved.len() + self.available.len(),
            sold: self.sold.len(),
            reserved: self.reserved.len(),
            available: self.available.len(),
        }
    }
}

/// 纯函数：根据目录与账本计算号码分布
pub fn resolve_allocation(
    catalog: &ElementCatalog,
    ledger: &[LedgerEntry],
    now: DateTime<Utc>,
    hold: Duration,
) -> Allocation {
    let mut sold: HashSet<&str> = HashSet::new();
    let mut reserved: HashSet<&str> = HashSet::new();

    for entry in ledger.iter().filter(|e| e.is_live(now, hold)) {
        let target = match entry.status {
            ParticipationStatus::Confirmed => &mut sold,
            _ => &mut reserved,
        };
        target.extend(entry.elements.iter().map(String::as_str));
    }

    let mut allocation = Allocation::default();
    for element in catalog.iter() {
        let bucket = if sold.contains(element.as_str()) {
            &mut allocation.sold
        } else if reserved.contains(element.as_str()) {
            &mut allocation.reserved
        } else {
            &mut allocation.available
        };
        bucket.push(element.clone());
    }
    allocation
}

/// 当前占用每个号码的有效参与记录
pub fn live_holders(
    ledger: &[LedgerEntry],
    now: DateTime<Utc>,
    hold: Duration,
) -> HashMap<String, i64> {
    let mut holders = HashMap::new();
    for entry in ledger.iter().filter(|e| e.is_live(now, hold)) {
        for element in &entry.elements {
            holders.insert(element.clone(), entry.participation_id);
        }
    }
    holders
}

/// 读取某活动未被拒绝的参与记录及其号码
pub async fn load_ledger<C: ConnectionTrait>(conn: &C, raffle_id: i64) -> AppResult<Vec<LedgerEntry>> {
    let rows = participations::Entity::find()
        .filter(participations::Column::RaffleId.eq(raffle_id))
        .filter(participations::Column::Status.ne(ParticipationStatus::Rejected))
        .order_by_asc(participations::Column::Id)
        .all(conn)
        .await?;

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = rows.iter().map(|p| p.id).collect();
    let element_rows = elements::Entity::find()
        .filter(elements::Column::ParticipationId.is_in(ids))
        .order_by_asc(elements::Column::ParticipationId)
        .order_by_asc(elements::Column::Position)
        .all(conn)
        .await?;

    let mut grouped: HashMap<i64, Vec<String>> = HashMap::new();
    for row in element_rows {
        grouped.entry(row.participation_id).or_default().push(row.element);
    }

    Ok(rows
        .into_iter()
        .map(|p| LedgerEntry {
            participation_id: p.id,
            status: p.status,
            created_at: p.created_at,
            elements: grouped.remove(&p.id).unwrap_or_default(),
        })
        .collect())
}

#[derive(Clone)]
pub struct AllocationService {
    pool: DatabaseConnection,
    hold: Duration,
}

impl AllocationService {
    pub fn new(pool: DatabaseConnection, hold: Duration) -> Self {
        Self { pool, hold }
    }

    /// 计算活动当前的号码分布
    pub async fn resolve<C: ConnectionTrait>(
        &self,
        conn: &C,
        raffle: &raffles::Model,
    ) -> AppResult<Allocation> {
        let catalog = raffle.catalog()?;
        let ledger = load_ledger(conn, raffle.id).await?;
        Ok(resolve_allocation(&catalog, &ledger, Utc::now(), self.hold))
    }

    pub async fn stats(&self, raffle: &raffles::Model) -> AppResult<AllocationStats> {
        Ok(self.resolve(&self.pool, raffle).await?.stats())
    }

    /// 号码可用性（公开接口）
    pub async fn availability(&self, raffle_id: i64) -> AppResult<AvailabilityResponse> {
        let raffle = raffles::Entity::find_by_id(raffle_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".to_string()))?;

        let allocation = self.resolve(&self.pool, &raffle).await?;
        Ok(AvailabilityResponse {
            raffle_id,
            available: allocation.available,
            reserved: allocation.reserved,
            sold: allocation.sold,
            as_of: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, status: ParticipationStatus, age_min: i64, elements: &[&str]) -> LedgerEntry {
        LedgerEntry {
            participation_id: id,
            status,
            created_at: Utc::now() - Duration::minutes(age_min),
            elements: elements.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn catalog(n: u32) -> ElementCatalog {
        ElementCatalog::numeric(n, false).unwrap()
    }

    #[test]
    fn test_empty_ledger_everything_available() {
        let a = resolve_allocation(&catalog(3), &[], Utc::now(), Duration::minutes(30));
        assert_eq!(a.available, vec!["1", "2", "3"]);
        assert!(a.sold.is_empty());
        assert!(a.reserved.is_empty());
        assert_eq!(a.stats().total, 3);
    }

    #[test]
    fn test_partition_in_catalog_order() {
        let ledger = vec![
            entry(1, ParticipationStatus::Pending, 1, &["5", "2"]),
            entry(2, ParticipationStatus::Confirmed, 60, &["4", "1"]),
            entry(3, ParticipationStatus::Rejected, 1, &["3"]),
        ];
        let a = resolve_allocation(&catalog(6), &ledger, Utc::now(), Duration::minutes(30));
        assert_eq!(a.sold, vec!["1", "4"]);
        assert_eq!(a.reserved, vec!["2", "5"]);
        assert_eq!(a.available, vec!["3", "6"]);
        assert_eq!(
            a.stats(),
            AllocationStats {
                total: 6,
                sold: 2,
                reserved: 2,
                available: 2
            }
        );
    }

    #[test]
    fn test_expired_pending_is_released() {
        let ledger = vec![entry(1, ParticipationStatus::Pending, 31, &["1", "2"])];
        let a = resolve_allocation(&catalog(3), &ledger, Utc::now(), Duration::minutes(30));
        assert!(a.reserved.is_empty());
        assert_eq!(a.available, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_sold_and_reserved_are_disjoint() {
        // 异常数据下 sold 优先
        let ledger = vec![
            entry(1, ParticipationStatus::Confirmed, 10, &["1", "2"]),
            entry(2, ParticipationStatus::Pending, 1, &["2", "3"]),
        ];
        let a = resolve_allocation(&catalog(4), &ledger, Utc::now(), Duration::minutes(30));
        let sold: HashSet<_> = a.sold.iter().collect();
        assert!(a.reserved.iter().all(|e| !sold.contains(e)));
        assert_eq!(a.sold, vec!["1", "2"]);
        assert_eq!(a.reserved, vec!["3"]);
    }

    #[test]
    fn test_elements_outside_catalog_are_ignored() {
        let ledger = vec![entry(1, ParticipationStatus::Confirmed, 1, &["99"])];
        let a = resolve_allocation(&catalog(2), &ledger, Utc::now(), Duration::minutes(30));
        assert!(a.sold.is_empty());
        assert_eq!(a.available.len(), 2);
    }

    #[test]
    fn test_live_holders() {
        let ledger = vec![
            entry(1, ParticipationStatus::Pending, 1, &["1"]),
            entry(2, ParticipationStatus::Pending, 90, &["2"]),
            entry(3, ParticipationStatus::Confirmed, 90, &["3"]),
        ];
        let holders = live_holders(&ledger, Utc::now(), Duration::minutes(30));
        assert_eq!(holders.get("1"), Some(&1));
        assert_eq!(holders.get("2"), None);
        assert_eq!(holders.get("3"), Some(&3));
    }
}
