/// Arrow schema definitions for feedback exports.
pub mod feedback {
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

    /// Prefix for flattened demographic columns (`demographic:age`).
    pub const DEMOGRAPHIC_PREFIX: &str = "demographic:";

    /// Separator for multi-valued cells (tags, key points) in tabular exports.
    pub const LIST_SEPARATOR: &str = ";";

    /// Fixed leading columns, in export order.
    pub const FIXED_COLUMNS: &[&str] = &[
        "id",
        "timestamp",
        "policy_document_id",
        "submitter",
        "feedback_kind",
        "sentiment_label",
        "free_text",
        "category_tags",
        "key_points",
    ];

    pub fn demographic_column(key: &str) -> String {
        format!("{DEMOGRAPHIC_PREFIX}{key}")
    }

    /// Schema for one export: fixed columns followed by one nullable Utf8
    /// column per demographic attribute, in the order given.
    ///
    /// `typed_timestamp` selects `Timestamp(µs, UTC)` (Parquet) over an
    /// RFC 3339 string (CSV).
    pub fn feedback_schema(demographic_keys: &[String], typed_timestamp: bool) -> Schema {
        let timestamp_type = if typed_timestamp {
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        } else {
            DataType::Utf8
        };
        let mut fields = vec![
            Field::new("id", DataType::UInt64, false),
            Field::new("timestamp", timestamp_type, false),
            Field::new("policy_document_id", DataType::Utf8, false),
            Field::new("submitter", DataType::Utf8, true),
            Field::new("feedback_kind", DataType::Utf8, true),
            Field::new("sentiment_label", DataType::Utf8, false),
            Field::new("free_text", DataType::Utf8, false),
            Field::new("category_tags", DataType::Utf8, false),
            Field::new("key_points", DataType::Utf8, false),
        ];
        fields.extend(
            demographic_keys
                .iter()
                .map(|k| Field::new(demographic_column(k), DataType::Utf8, true)),
        );
        Schema::new(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::feedback;
    use arrow::datatypes::DataType;

    #[test]
    fn fixed_columns_lead() {
        let schema = feedback::feedback_schema(&[], false);
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, feedback::FIXED_COLUMNS);
    }

    #[test]
    fn demographic_columns_follow() {
        let keys = vec!["age".to_string(), "region".to_string()];
        let schema = feedback::feedback_schema(&keys, true);
        assert_eq!(schema.fields().len(), feedback::FIXED_COLUMNS.len() + 2);
        assert!(schema.field_with_name("demographic:age").is_ok());
        assert!(matches!(
            schema.field_with_name("timestamp").unwrap().data_type(),
            DataType::Timestamp(_, _)
        ));
    }
}
