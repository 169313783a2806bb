use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order lifecycle state
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[strum(ascii_case_insensitive)]
pub enum OrderStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Completed")]
    Completed,
    #[sea_orm(string_value = "Shipped")]
    Shipped,
    #[sea_orm(string_value = "Canceled")]
    Canceled,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(column_type = "Text", nullable)]
    pub address: Option<String>,
    /// Sum of the order's line totals at settlement
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub commission_percentage: Decimal,
    /// Always derived from `total_amount` and `commission_percentage`
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub commission_amount: Decimal,
    pub status: OrderStatus,
    #[sea_orm(nullable)]
    pub gateway_order_id: Option<String>,
    #[sea_orm(unique, nullable)]
    pub gateway_payment_id: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
