use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Unresolved BOM line: a normalized part number with no catalog match yet.
/// Deleted or promoted to a bom_item once a reviewer resolves it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "draft_bom_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub bom_id: i32,
    pub part_number: String,
    pub quantity: i32,
    pub is_resolved: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bom::Entity",
        from = "Column::BomId",
        to = "super::bom::Column::Id"
    )]
    Bom,
}

impl Related<super::bom::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bom.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
