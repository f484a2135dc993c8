use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::RawTable;
use crate::sources;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub fn row_id(headers: &[String], cells: &[String]) -> anyhow::Result<Uuid> {
    let name = serde_json::to_vec(&(headers, cells)).context("failed to encode row key")?;
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, &name))
}

/// Store every row of `table` with its own header row, so exports with
/// different survey wordings can live side by side. Rows already stored
/// with the same headers and cells are skipped.
pub async fn store_table(pool: &PgPool, table: &RawTable, source: &str) -> anyhow::Result<usize> {
    let mut inserted = 0usize;
    let mut tx = pool.begin().await?;

    for row in &table.rows {
        let mut cells = row.clone();
        cells.resize(table.headers.len(), String::new());

        let result = sqlx::query(
            r#"
            INSERT INTO nps_dashboard.raw_responses (id, source, headers, cells)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(row_id(&table.headers, &cells)?)
        .bind(source)
        .bind(&table.headers)
        .bind(&cells)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    tx.commit().await?;
    info!(source, inserted, skipped = table.rows.len() - inserted, "stored raw survey rows");
    Ok(inserted)
}

pub async fn seed(pool: &PgPool, table: &RawTable, seed: u64) -> anyhow::Result<usize> {
    store_table(pool, table, &format!("seed-{seed}")).await
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let table = sources::read_csv_table(csv_path)?;
    let source = csv_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| csv_path.display().to_string());
    store_table(pool, &table, &format!("import-{source}")).await
}

pub async fn fetch_raw_tables(pool: &PgPool) -> anyhow::Result<Vec<RawTable>> {
    let records = sqlx::query(
        r#"
        SELECT headers, cells
        FROM nps_dashboard.raw_responses
        ORDER BY imported_at, id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch raw survey rows")?;

    let mut tables: Vec<RawTable> = Vec::new();
    for record in records {
        let headers: Vec<String> = record.try_get("headers")?;
        let cells: Vec<String> = record.try_get("cells")?;
        match tables.iter_mut().find(|t| t.headers == headers) {
            Some(table) => table.push_row(cells),
            None => {
                let mut table = RawTable::new(headers);
                table.push_row(cells);
                tables.push(table);
            }
        }
    }

    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn row_id_depends_on_content_only() {
        let headers = strings(&["Horodateur", "Recommandation"]);
        let first = row_id(&headers, &strings(&["01/03/2024 10:00:00", "9"])).unwrap();
        assert_eq!(first, row_id(&headers, &strings(&["01/03/2024 10:00:00", "9"])).unwrap());
        assert_ne!(first, row_id(&headers, &strings(&["01/03/2024 10:00:00", "8"])).unwrap());
        assert_ne!(
            first,
            row_id(&strings(&["Date", "Recommandation"]), &strings(&["01/03/2024 10:00:00", "9"]))
                .unwrap()
        );
    }

    #[test]
    fn row_id_keeps_cell_boundaries() {
        let headers = strings(&["a", "b"]);
        assert_ne!(
            row_id(&headers, &strings(&["x,y", ""])).unwrap(),
            row_id(&headers, &strings(&["x", "y"])).unwrap()
        );
    }
}
