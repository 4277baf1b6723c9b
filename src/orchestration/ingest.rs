//! Export ingestion: CSV file to stored transactions.

use crate::db::Repository;
use crate::domain::Account;
use crate::loader::{self, LoadError, LoadReport};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Counts batch callers report after an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    pub valid: usize,
    pub invalid: usize,
    pub ignored: usize,
    /// Newly stored rows (valid + invalid minus duplicates of earlier
    /// imports).
    pub inserted: usize,
}

/// Loads broker exports and stores the parsed transactions idempotently.
pub struct Ingestor {
    repo: Arc<Repository>,
}

impl Ingestor {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Import one export file for one account.
    pub async fn ingest_file(
        &self,
        path: &Path,
        account: &Account,
    ) -> Result<IngestReport, IngestError> {
        let report = loader::load_file(path, account)?;
        self.store(report).await
    }

    /// Store a parsed report. Invalid rows are kept for audit; the validity
    /// column excludes them from matching.
    pub async fn store(&self, report: LoadReport) -> Result<IngestReport, IngestError> {
        let (valid, invalid, ignored) = report.counts();
        let mut rows = report.valid;
        rows.extend(report.invalid);
        let inserted = self.repo.insert_transactions_batch(&rows).await?;
        info!(valid, invalid, ignored, inserted, "ingested export");
        Ok(IngestReport {
            valid,
            invalid,
            ignored,
            inserted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::Ticker;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const EXPORT: &str = "\
\"01/24/2022\",\"Sell to Open\",\"AAPL 01/28/2022 140.00 P\",\"PUT AAPL\",\"10\",\"$0.86\",\"$6.60\",\"$853.40\",\"\"
\"01/24/2022\",\"Buy to Open\",\"AAPL 01/28/2022 135.00 P\",\"PUT AAPL\",\"10\",\"$0.54\",\"$6.60\",\"-$546.60\",\"\"
";

    async fn setup() -> (Ingestor, Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));
        (Ingestor::new(repo.clone()), repo, temp_dir)
    }

    #[tokio::test]
    async fn test_ingest_file_then_reimport() {
        let (ingestor, repo, _temp) = setup().await;
        let account = Account::new("1234");

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(EXPORT.as_bytes()).unwrap();

        let report = ingestor.ingest_file(file.path(), &account).await.unwrap();
        assert_eq!(report.valid, 2);
        assert_eq!(report.inserted, 2);

        // second import of the same file inserts nothing
        let again = ingestor.ingest_file(file.path(), &account).await.unwrap();
        assert_eq!(again.valid, 2);
        assert_eq!(again.inserted, 0);

        let rows = repo
            .query_effective_ungrouped(&account, &Ticker::new("AAPL"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
