use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "suppliers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    #[sea_orm(unique)]
    pub supplier_code: String,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    /// RFQ mail goes to this address
    pub contact_email: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::supplier_manufacturer::Entity")]
    SupplierManufacturers,
    #[sea_orm(has_many = "super::rfq::Entity")]
    Rfqs,
}

impl Related<super::supplier_manufacturer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SupplierManufacturers.def()
    }
}

impl Related<super::rfq::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rfqs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
