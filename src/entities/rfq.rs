use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rfqs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub bom_id: i32,
    pub supplier_id: i32,
    /// User who generated the RFQ; identity management is external
    pub user_id: String,
    pub status: RfqStatus,
    pub due_date: DateTimeUtc,
    pub sent_date: Option<DateTimeUtc>,
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Display number, e.g. `RFQ-000007`. Used in exports, mail and filenames.
    pub fn number(&self) -> String {
        format_rfq_number(self.id)
    }
}

/// Formats an RFQ id as its fixed-width display code.
pub fn format_rfq_number(id: i32) -> String {
    format!("RFQ-{:06}", id)
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum RfqStatus {
    /// Items may still be edited; the RFQ may be deleted
    #[sea_orm(string_value = "Draft")]
    Draft,
    /// Dispatched to the supplier; awaiting quote
    #[sea_orm(string_value = "Sent")]
    Sent,
    /// Supplier quote recorded
    #[sea_orm(string_value = "Received")]
    Received,
    #[sea_orm(string_value = "Canceled")]
    Canceled,
}

impl RfqStatus {
    /// Stable string label, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            RfqStatus::Draft => "Draft",
            RfqStatus::Sent => "Sent",
            RfqStatus::Received => "Received",
            RfqStatus::Canceled => "Canceled",
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bom::Entity",
        from = "Column::BomId",
        to = "super::bom::Column::Id"
    )]
    Bom,
    #[sea_orm(
        belongs_to = "super::supplier::Entity",
        from = "Column::SupplierId",
        to = "super::supplier::Column::Id"
    )]
    Supplier,
    #[sea_orm(has_many = "super::rfq_item::Entity")]
    RfqItems,
}

impl Related<super::bom::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bom.def()
    }
}

impl Related<super::supplier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Supplier.def()
    }
}

impl Related<super::rfq_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RfqItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfq_number_is_zero_padded() {
        assert_eq!(format_rfq_number(7), "RFQ-000007");
        assert_eq!(format_rfq_number(123_456), "RFQ-123456");
    }
}
