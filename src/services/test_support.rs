//! 服务层测试辅助：内存 SQLite + 假支付网关

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    Schema, Set,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::ReservationConfig;
use crate::entities::{
    ElementKind, UserRole, participation_element_entity, participation_entity,
    payment_event_entity, raffle_entity, user_entity,
};
use crate::error::{AppError, AppResult};
use crate::external::{IntentStatus, NewPaymentIntent, PaymentGateway, PaymentIntentInfo};

pub async fn setup_test_db() -> DatabaseConnection {
    // 内存库每个连接各自独立，只能用单连接
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();

    let schema = Schema::new(DbBackend::Sqlite);

    let stmt = schema.create_table_from_entity(user_entity::Entity);
    db.execute(db.get_database_backend().build(&stmt)).await.unwrap();

    let stmt = schema.create_table_from_entity(raffle_entity::Entity);
    db.execute(db.get_database_backend().build(&stmt)).await.unwrap();

    let stmt = schema.create_table_from_entity(participation_entity::Entity);
    db.execute(db.get_database_backend().build(&stmt)).await.unwrap();

    let stmt = schema.create_table_from_entity(participation_element_entity::Entity);
    db.execute(db.get_database_backend().build(&stmt)).await.unwrap();

    let stmt = schema.create_table_from_entity(payment_event_entity::Entity);
    db.execute(db.get_database_backend().build(&stmt)).await.unwrap();

    db
}

pub fn reservation() -> ReservationConfig {
    ReservationConfig {
        hold_minutes: 30,
        sweep_interval_secs: 0,
        max_elements_per_participation: 10,
    }
}

pub async fn seed_user(db: &DatabaseConnection, email: &str, role: UserRole) -> user_entity::Model {
    let now = Utc::now();
    user_entity::ActiveModel {
        email: Set(email.to_string()),
        display_name: Set("Test User".to_string()),
        password_hash: Set("not-a-real-hash".to_string()),
        role: Set(role),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// 数字号码活动，单价 10
pub async fn seed_numeric_raffle(
    db: &DatabaseConnection,
    creator_id: i64,
    count: i32,
) -> raffle_entity::Model {
    let now = Utc::now();
    raffle_entity::ActiveModel {
        creator_id: Set(creator_id),
        name: Set("Test raffle".to_string()),
        description: Set(None),
        element_kind: Set(ElementKind::Numeric),
        element_count: Set(count),
        zero_padded: Set(false),
        custom_elements: Set(None),
        price_cents: Set(10),
        currency: Set("eur".to_string()),
        starts_at: Set(None),
        ends_at: Set(now + Duration::days(7)),
        is_active: Set(true),
        winning_element: Set(None),
        result_published: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// 将参与记录的创建时间回拨，用于模拟预留过期
pub async fn backdate_participation(
    db: &DatabaseConnection,
    participation_id: i64,
    created_at: DateTime<Utc>,
) {
    participation_entity::ActiveModel {
        id: Set(participation_id),
        created_at: Set(created_at),
        ..Default::default()
    }
    .update(db)
    .await
    .unwrap();
}

#[derive(Default)]
pub struct FakeGateway {
    seq: AtomicU64,
    intents: Mutex<HashMap<String, PaymentIntentInfo>>,
    canceled: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn set_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.status = status;
        }
    }

    /// 以指定 id 登记一个待支付意图
    pub fn insert_open(&self, intent_id: &str, amount: i64) {
        let info = PaymentIntentInfo {
            id: intent_id.to_string(),
            client_secret: Some(format!("{intent_id}_secret")),
            amount,
            currency: "eur".to_string(),
            status: IntentStatus::Open,
            metadata: HashMap::new(),
        };
        self.intents.lock().unwrap().insert(intent_id.to_string(), info);
    }

    pub fn created_count(&self) -> usize {
        self.intents.lock().unwrap().len()
    }

    pub fn canceled(&self) -> Vec<String> {
        self.canceled.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, request: NewPaymentIntent) -> AppResult<PaymentIntentInfo> {
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pi_fake_{n}");
        let info = PaymentIntentInfo {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret")),
            amount: request.amount,
            currency: request.currency,
            status: IntentStatus::Open,
            metadata: request.metadata,
        };
        self.intents.lock().unwrap().insert(id, info.clone());
        Ok(info)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> AppResult<PaymentIntentInfo> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| AppError::ExternalApiError(format!("No such payment_intent: {intent_id}")))
    }

    async fn cancel_intent(&self, intent_id: &str) -> AppResult<()> {
        self.set_status(intent_id, IntentStatus::Canceled);
        self.canceled.lock().unwrap().push(intent_id.to_string());
        Ok(())
    }
}
