use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Which pending purchase a checkout (and later its confirmation) settles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum CheckoutMode {
    #[sea_orm(string_value = "cart")]
    Cart,
    #[sea_orm(string_value = "buy_now")]
    BuyNow,
}

/// Gateway order opened by checkout, keyed by the gateway's order id.
///
/// Confirmation only settles a payment whose order was issued here, for the
/// same caller and mode, and whose recomputed charge equals `amount_minor_units`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "checkout_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub gateway_order_id: String,
    pub user_id: Uuid,
    pub mode: CheckoutMode,
    pub amount_minor_units: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
