use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Snapshot of a BOM line on an RFQ. Quantity is copied at generation time
/// and tracked independently of the source line. UOM, price and ETA stay
/// empty until the supplier replies. Unique per (rfq_id, bom_item_id).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rfq_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub rfq_id: i32,
    pub bom_item_id: i32,
    pub quantity: i32,
    pub uom: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 2)))", nullable)]
    pub price: Option<Decimal>,
    pub eta: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::rfq::Entity",
        from = "Column::RfqId",
        to = "super::rfq::Column::Id"
    )]
    Rfq,
    #[sea_orm(
        belongs_to = "super::bom_item::Entity",
        from = "Column::BomItemId",
        to = "super::bom_item::Column::Id"
    )]
    BomItem,
}

impl Related<super::rfq::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rfq.def()
    }
}

impl Related<super::bom_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
