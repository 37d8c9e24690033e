use serde::{Deserialize, Serialize};

use crate::models::schema::ForeignKeySchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinType {
    OneToMany,
    ManyToMany,
    OneToOne,
}

/// A join between exactly two tables. Explicit relationships list the
/// dependent table first; semantic ones keep whatever order the generative
/// service chose. The join type of a semantic relationship is a hint only.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub name: String,
    pub models: [String; 2],
    pub join_type: JoinType,
    pub condition: String,
}

impl Relationship {
    /// Builds the explicit relationship for a declared foreign key.
    pub fn from_foreign_key(fk: &ForeignKeySchema) -> Self {
        Self {
            name: format!("{}_{}_Relation", fk.table, fk.referenced_table),
            models: [fk.table.clone(), fk.referenced_table.clone()],
            join_type: JoinType::OneToMany,
            condition: format!(
                "{}.{} = {}.{}",
                fk.referenced_table, fk.referenced_column, fk.table, fk.column
            ),
        }
    }

    /// Structural checks beyond what decoding enforces.
    pub fn validate(&self) -> Result<(), String> {
        if self.models.iter().any(|m| m.trim().is_empty()) {
            return Err("relationship names an empty model".to_string());
        }
        if !self.condition.contains('=') {
            return Err(format!(
                "condition '{}' is not an equality expression",
                self.condition
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_foreign_key() {
        let fk = ForeignKeySchema {
            table: "OrderTable".to_string(),
            column: "CustomerId".to_string(),
            referenced_table: "CustomerTable".to_string(),
            referenced_column: "CustomerId".to_string(),
        };

        let rel = Relationship::from_foreign_key(&fk);
        assert_eq!(rel.name, "OrderTable_CustomerTable_Relation");
        assert_eq!(rel.models, ["OrderTable".to_string(), "CustomerTable".to_string()]);
        assert_eq!(rel.join_type, JoinType::OneToMany);
        assert_eq!(rel.condition, "CustomerTable.CustomerId = OrderTable.CustomerId");
    }

    #[test]
    fn test_decode_rejects_wrong_model_count() {
        let three = serde_json::json!({
            "name": "x",
            "models": ["a", "b", "c"],
            "joinType": "ONE_TO_ONE",
            "condition": "a.id = b.id"
        });
        assert!(serde_json::from_value::<Relationship>(three).is_err());

        let unknown_join = serde_json::json!({
            "name": "x",
            "models": ["a", "b"],
            "joinType": "SIDEWAYS",
            "condition": "a.id = b.id"
        });
        assert!(serde_json::from_value::<Relationship>(unknown_join).is_err());
    }

    #[test]
    fn test_join_type_labels() {
        // Serde is the only textual form of a join type.
        assert_eq!(serde_json::to_value(JoinType::OneToMany).unwrap(), "ONE_TO_MANY");
        assert_eq!(serde_json::to_value(JoinType::ManyToMany).unwrap(), "MANY_TO_MANY");
        assert_eq!(serde_json::to_value(JoinType::OneToOne).unwrap(), "ONE_TO_ONE");
    }

    #[test]
    fn test_validate() {
        let mut rel = Relationship {
            name: "r".to_string(),
            models: ["a".to_string(), "b".to_string()],
            join_type: JoinType::ManyToMany,
            condition: "a.id = b.a_id".to_string(),
        };
        assert!(rel.validate().is_ok());

        rel.condition = "a joins b".to_string();
        assert!(rel.validate().is_err());
    }
}
