// External crates
use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Read a CSV file with a header row into a DataFrame
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
///
/// # Returns
///
/// Returns the DataFrame, or an error naming the file that could not be read
pub fn read_csv_file<P: AsRef<Path>>(file_path: P) -> Result<DataFrame> {
    let path = file_path.as_ref();
    if !path.exists() {
        return Err(anyhow::anyhow!("File not found: {}", path.display()));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("Failed to open {}", path.display()))?
        .finish()
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(df)
}

/// Write a DataFrame to a CSV file, creating parent directories as needed
pub fn write_csv_file<P: AsRef<Path>>(df: &mut DataFrame, file_path: P) -> Result<()> {
    let path = file_path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .context("Failed to create output directory")?;
        }
    }

    let mut file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
