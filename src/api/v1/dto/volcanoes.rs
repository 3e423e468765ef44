/*
 * Responsibility
 * - Volcano の request/response DTO
 * - VolcanoName と id 以外のフィールドはそのまま保持する (スキーマは持たない)
 */
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::repos::volcano_repo::VolcanoRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volcano {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "VolcanoName")]
    pub volcano_name: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Volcano {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.volcano_name.trim().is_empty() {
            return Err("VolcanoName is required");
        }
        if let Some(id) = &self.id
            && id.trim().is_empty()
        {
            return Err("id cannot be empty");
        }

        Ok(())
    }

    /// Assigns a UUID v4 `id` when the client sent none.
    pub fn into_record(mut self) -> Result<VolcanoRecord, serde_json::Error> {
        let id = self
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let volcano_name = self.volcano_name.clone();

        let document = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => return Err(serde::ser::Error::custom("volcano is not a JSON object")),
        };

        Ok(VolcanoRecord {
            id,
            volcano_name,
            document,
        })
    }

    pub fn from_record(record: VolcanoRecord) -> Result<Self, serde_json::Error> {
        let mut volcano: Volcano = serde_json::from_value(Value::Object(record.document))?;
        volcano.id.get_or_insert(record.id);
        Ok(volcano)
    }
}
