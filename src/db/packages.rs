//! Credit package catalog queries

use async_trait::async_trait;

use super::pool::DbPool;
use crate::domain::CreditPackage;
use crate::store::{PackageCatalog, StoreResult};

/// Reads `credit_packages`; rows are maintained out of band
pub struct PgPackageCatalog {
    pool: DbPool,
}

impl PgPackageCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PackageCatalog for PgPackageCatalog {
    async fn list_packages(&self) -> StoreResult<Vec<CreditPackage>> {
        let client = self.pool.get().await?;

        let rows = client.query(
            "SELECT id, price, credit_limit FROM credit_packages ORDER BY price ASC, id ASC",
            &[]
        ).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let limit: i32 = row.get("credit_limit");
                CreditPackage::new(
                    row.get::<_, String>("id"),
                    row.get("price"),
                    u32::try_from(limit).unwrap_or(0),
                )
            })
            .collect())
    }
}
