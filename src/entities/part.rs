use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog part. The part number is stored normalized (uppercase
/// alphanumerics only) so catalog lookups and import matching share one
/// key space.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "parts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub part_number: String,
    pub description: String,
    pub manufacturer_id: i32,
    pub unit: UnitType,
    /// Installation labour, in hours
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub labour: Decimal,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

/// Unit of measure: each, meter, hundred, feet.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum UnitType {
    #[sea_orm(string_value = "E")]
    E,
    #[sea_orm(string_value = "M")]
    M,
    #[sea_orm(string_value = "C")]
    C,
    #[sea_orm(string_value = "Ft")]
    Ft,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::manufacturer::Entity",
        from = "Column::ManufacturerId",
        to = "super::manufacturer::Column::Id"
    )]
    Manufacturer,
    #[sea_orm(has_many = "super::bom_item::Entity")]
    BomItems,
}

impl Related<super::manufacturer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Manufacturer.def()
    }
}

impl Related<super::bom_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
