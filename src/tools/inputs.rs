//! Tool input types with JSON Schema generation.
//!
//! Each tool's arguments are a distinct typed struct validated by serde
//! before dispatch, rather than an open-ended dictionary inspected ad hoc.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input for the `read_data` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadDataInput {
    /// The T-SQL SELECT statement to execute.
    #[schemars(description = "T-SQL SELECT statement to execute")]
    pub query: String,
}

/// Input for the `list_table` tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListTableInput {
    /// Schema names to filter by; all base tables are listed when omitted
    /// or empty.
    #[serde(default)]
    #[schemars(description = "Optional schema names to filter by")]
    pub parameters: Option<Vec<String>>,
}

impl ListTableInput {
    /// The effective schema filter: empty means unfiltered.
    pub fn schema_filter(&self) -> Vec<String> {
        self.parameters.clone().unwrap_or_default()
    }
}

/// Input for the `describe_table` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DescribeTableInput {
    /// The table to describe, matched by unqualified name.
    #[schemars(description = "Name of the table to describe")]
    pub table_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_data_input_requires_query() {
        let input: ReadDataInput =
            serde_json::from_value(json!({"query": "SELECT 1"})).unwrap();
        assert_eq!(input.query, "SELECT 1");

        assert!(serde_json::from_value::<ReadDataInput>(json!({})).is_err());
        assert!(serde_json::from_value::<ReadDataInput>(json!({"query": 42})).is_err());
    }

    #[test]
    fn test_list_table_parameters_optional() {
        let input: ListTableInput = serde_json::from_value(json!({})).unwrap();
        assert!(input.schema_filter().is_empty());

        let input: ListTableInput =
            serde_json::from_value(json!({"parameters": ["Sales", "HR"]})).unwrap();
        assert_eq!(input.schema_filter(), vec!["Sales", "HR"]);
    }

    #[test]
    fn test_describe_table_uses_camel_case() {
        let input: DescribeTableInput =
            serde_json::from_value(json!({"tableName": "Customer"})).unwrap();
        assert_eq!(input.table_name, "Customer");

        assert!(serde_json::from_value::<DescribeTableInput>(json!({})).is_err());
        assert!(
            serde_json::from_value::<DescribeTableInput>(json!({"tableName": null})).is_err()
        );
    }

    #[test]
    fn test_schemas_mark_required_fields() {
        let schema = serde_json::to_value(schemars::schema_for!(ReadDataInput)).unwrap();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "query"));

        let schema = serde_json::to_value(schemars::schema_for!(DescribeTableInput)).unwrap();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "tableName"));
    }
}
