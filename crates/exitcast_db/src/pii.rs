//! Sensitive identifier column access for the tokenizer.

use tracing::info;

use crate::error::Result;
use crate::ClientStore;

/// Rewrites per batched statement. Three parameters each keeps us well under
/// every backend's bind limit.
const WRITE_CHUNK: usize = 300;

/// A stored SSN value and the client it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SsnRow {
    pub ssn: String,
    pub personal_id: String,
}

/// Replacement of one stored SSN value for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsnRewrite {
    pub personal_id: String,
    /// The value currently in the store
    pub stored: String,
    pub token: String,
}

impl ClientStore {
    /// Fetch every non-null SSN with its client id.
    pub async fn fetch_ssn_rows(&self) -> Result<Vec<SsnRow>> {
        let sql = format!(
            "SELECT ssn, CAST(personal_id AS TEXT) FROM {} WHERE ssn IS NOT NULL",
            self.table
        );
        let rows: Vec<(String, String)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(ssn, personal_id)| SsnRow { ssn, personal_id })
            .collect())
    }

    /// Replace stored SSN values in one transaction.
    ///
    /// A rewrite only touches rows that still hold the value it was computed
    /// from, so tokens already at rest for the same client are never
    /// overwritten. Returns the number of store rows rewritten.
    pub async fn write_ssn_tokens(&self, rewrites: &[SsnRewrite]) -> Result<u64> {
        if rewrites.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for chunk in rewrites.chunks(WRITE_CHUNK) {
            let values = (0..chunk.len())
                .map(|i| format!("(${}, ${}, ${})", i * 3 + 1, i * 3 + 2, i * 3 + 3))
                .collect::<Vec<_>>()
                .join(", ");
            let matches = format!(
                "s.personal_id = CAST({table}.personal_id AS TEXT) AND s.stored = {table}.ssn",
                table = self.table
            );
            let sql = format!(
                "WITH s(personal_id, stored, token) AS (VALUES {values}) \
                 UPDATE {table} SET ssn = (SELECT s.token FROM s WHERE {matches}) \
                 WHERE EXISTS (SELECT 1 FROM s WHERE {matches})",
                values = values,
                table = self.table,
                matches = matches
            );

            let mut query = sqlx::query(&sql);
            for rewrite in chunk {
                query = query
                    .bind(rewrite.personal_id.as_str())
                    .bind(rewrite.stored.as_str())
                    .bind(rewrite.token.as_str());
            }
            written += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        info!(table = %self.table, rows = written, "Wrote SSN tokens");
        Ok(written)
    }
}
