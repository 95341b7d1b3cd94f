use serde::Deserialize;
use serde_json::Value;

/// Response from `/records/query`.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub records: Vec<Record>,
}

/// Response from `/internal/records/query/batch`.
#[derive(Debug, Deserialize)]
pub struct BatchQueryResponse {
    #[serde(default)]
    pub batch: Vec<QueryResponse>,
}

impl BatchQueryResponse {
    /// `itemCount` of the first record of the first batch entry, as returned
    /// by a `HyperionIndexCountLookup` query.
    pub fn item_count(&self) -> Option<u64> {
        self.batch
            .first()?
            .records
            .first()?
            .fields["itemCount"]["value"]
            .as_u64()
    }
}

/// A CloudKit record. Fields are kept as dynamic JSON because Apple's schema
/// varies by record type and changes without notice.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub record_name: String,
    #[serde(default)]
    pub record_type: String,
    #[serde(default)]
    pub fields: Value,
}

impl Record {
    /// `fields.<name>.value` as a string, if present.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields[name]["value"].as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_response() {
        let json = r#"{
            "records": [
                {
                    "recordName": "ABC",
                    "recordType": "CPLAsset",
                    "fields": {"masterRef": {"value": {"recordName": "M1"}}, "state": {"value": "FINISHED"}}
                }
            ],
            "continuationMarker": "xyz"
        }"#;
        let resp: QueryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.records.len(), 1);
        assert_eq!(resp.records[0].record_type, "CPLAsset");
        assert_eq!(resp.records[0].field_str("state"), Some("FINISHED"));
        assert_eq!(resp.records[0].field_str("missing"), None);
    }

    #[test]
    fn test_batch_item_count() {
        let json = r#"{
            "batch": [
                {"records": [{"recordName": "X", "recordType": "HyperionIndexCountLookup",
                              "fields": {"itemCount": {"value": 1234, "type": "INT64"}}}]}
            ]
        }"#;
        let resp: BatchQueryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.item_count(), Some(1234));

        let empty: BatchQueryResponse = serde_json::from_str(r#"{"batch": []}"#).unwrap();
        assert_eq!(empty.item_count(), None);
    }

    #[test]
    fn test_record_missing_fields() {
        let rec: Record = serde_json::from_str(r#"{"recordName": "A"}"#).unwrap();
        assert_eq!(rec.record_name, "A");
        assert!(rec.record_type.is_empty());
        assert!(rec.fields.is_null());
        assert_eq!(rec.field_str("albumNameEnc"), None);
    }
}
