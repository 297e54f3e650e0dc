use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "manufacturers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::part::Entity")]
    Parts,
    #[sea_orm(has_many = "super::supplier_manufacturer::Entity")]
    SupplierManufacturers,
}

impl Related<super::part::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Parts.def()
    }
}

impl Related<super::supplier_manufacturer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SupplierManufacturers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
