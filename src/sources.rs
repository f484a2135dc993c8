use std::io;
use std::path::Path;

use anyhow::Context;
use csv::ReaderBuilder;
use tracing::{info, warn};

use crate::models::RawTable;

pub fn read_csv_table(path: &Path) -> anyhow::Result<RawTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open survey export {}", path.display()))?;
    let table = read_csv(file).with_context(|| format!("failed to read {}", path.display()))?;
    info!(
        path = %path.display(),
        rows = table.rows.len(),
        columns = table.headers.len(),
        "loaded survey export"
    );
    Ok(table)
}

pub fn read_csv<R: io::Read>(reader: R) -> anyhow::Result<RawTable> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr
        .byte_headers()
        .context("missing header row")?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut table = RawTable::new(headers);
    for (index, result) in rdr.byte_records().enumerate() {
        match result {
            Ok(record) => table.push_row(
                record
                    .iter()
                    .map(|cell| String::from_utf8_lossy(cell).into_owned())
                    .collect(),
            ),
            Err(err) => {
                warn!(record = index + 1, error = %err, "skipping unreadable record");
                table.unreadable_rows += 1;
            }
        }
    }
    Ok(table)
}

pub fn write_csv_table(path: &Path, table: &RawTable) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    wtr.write_record(&table.headers)?;
    for row in &table.rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_ragged_exports() {
        let data = "\u{feff}Horodateur,Recommandation,Votre Nom\n\
                    01/03/2024 10:00:00,9,Martin\n\
                    02/03/2024 10:00:00,7\n";
        let table = read_csv(data.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["Horodateur", "Recommandation", "Votre Nom"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(RawTable::cell(&table.rows[1], 2), "");
        assert_eq!(table.unreadable_rows, 0);
    }

    #[test]
    fn quoted_free_text_headers_survive() {
        let data = "\"Notez de 1 à 5, votre satisfaction [Les coachs]\",Recommandation\n4,10\n";
        let table = read_csv(data.as_bytes()).unwrap();
        assert_eq!(table.headers[0], "Notez de 1 à 5, votre satisfaction [Les coachs]");
        assert_eq!(table.rows[0], vec!["4".to_string(), "10".to_string()]);
    }
}
