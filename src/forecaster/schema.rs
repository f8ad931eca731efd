// External crates
use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Local modules
use crate::error::ForecastError;

/// Column roles of a forecasting table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastingSchema {
    pub id_col: String,
    pub time_col: String,
    pub target: String,
    #[serde(default)]
    pub past_covariates: Vec<String>,
    #[serde(default)]
    pub future_covariates: Vec<String>,
    pub forecast_length: usize,
}

impl ForecastingSchema {
    /// Read a schema from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file {}", path.display()))?;
        let schema: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse schema file {}", path.display()))?;
        Ok(schema)
    }

    pub fn has_past_covariates(&self) -> bool {
        !self.past_covariates.is_empty()
    }

    pub fn has_future_covariates(&self) -> bool {
        !self.future_covariates.is_empty()
    }

    /// Check that `df` carries the id, time and target columns plus the given extra columns
    pub fn validate_columns(
        &self,
        df: &DataFrame,
        extra: &[String],
        table: &str,
    ) -> Result<(), ForecastError> {
        let required = [&self.id_col, &self.time_col, &self.target]
            .into_iter()
            .chain(extra.iter());
        for column in required {
            if df.column(column).is_err() {
                return Err(ForecastError::ColumnNotFound {
                    column: column.clone(),
                    table: table.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn test_schema_from_json_file_defaults_covariates() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"{
                "id_col": "series_id",
                "time_col": "date",
                "target": "sales",
                "forecast_length": 7
            }"#,
        )?;

        let schema = ForecastingSchema::from_json_file(&path)?;
        assert_eq!(schema.id_col, "series_id");
        assert_eq!(schema.forecast_length, 7);
        assert!(!schema.has_past_covariates());
        assert!(!schema.has_future_covariates());
        Ok(())
    }

    #[test]
    fn test_validate_columns_reports_missing_column() {
        let schema = ForecastingSchema {
            id_col: "id".to_string(),
            time_col: "t".to_string(),
            target: "y".to_string(),
            past_covariates: vec![],
            future_covariates: vec!["holiday".to_string()],
            forecast_length: 2,
        };
        let df = df!("id" => ["a"], "t" => [0i64], "y" => [1.0]).unwrap();

        assert!(schema.validate_columns(&df, &[], "history").is_ok());
        let err = schema
            .validate_columns(&df, &schema.future_covariates, "history")
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::ColumnNotFound { ref column, .. } if column == "holiday"
        ));
    }
}
