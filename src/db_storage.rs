use crate::errors::AppError;
use crate::models::{level_for_xp, BrandRecord, BrandRow, NewBrand};
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const SELECT_BRAND: &str = r#"
    SELECT id_unico, company_name, email, password_hash, diagnostic_score,
           unlocked_mission, xp, level, strategy, onboarding_metadata,
           created_at, updated_at
    FROM brands
"#;

/// Record store accessor for brand rows.
///
/// `Memory` is the development fallback used when no database is configured.
/// It lives for the process lifetime only.
#[derive(Clone)]
pub enum BrandStorage {
    Postgres(PgPool),
    Memory(Arc<RwLock<HashMap<String, BrandRecord>>>),
}

impl BrandStorage {
    pub fn postgres(pool: PgPool) -> Self {
        BrandStorage::Postgres(pool)
    }

    pub fn in_memory() -> Self {
        BrandStorage::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            BrandStorage::Postgres(_) => "postgres",
            BrandStorage::Memory(_) => "memory",
        }
    }

    /// Creates a brand row with a fresh `idUnico`. Emails are unique.
    pub async fn create(&self, new: NewBrand) -> Result<BrandRecord, AppError> {
        let now = Utc::now();
        let record = BrandRecord {
            id_unico: Uuid::new_v4().to_string(),
            company_name: new.company_name,
            email: new.email.trim().to_lowercase(),
            password_hash: new.password_hash,
            diagnostic_score: new.diagnostic_score,
            unlocked_mission: None,
            xp: 0,
            level: level_for_xp(0).to_string(),
            strategy: serde_json::Value::Null,
            onboarding_metadata: new.onboarding_metadata,
            created_at: now,
            updated_at: now,
        };

        match self {
            BrandStorage::Postgres(pool) => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO brands (
                        id_unico, company_name, email, password_hash, diagnostic_score,
                        unlocked_mission, xp, level, strategy, onboarding_metadata,
                        created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, NULL, $6, $7, NULL, $8, $9, $9)
                    "#,
                )
                .bind(&record.id_unico)
                .bind(&record.company_name)
                .bind(&record.email)
                .bind(&record.password_hash)
                .bind(record.diagnostic_score)
                .bind(record.xp)
                .bind(&record.level)
                .bind(record.onboarding_metadata.to_storage_string())
                .bind(now)
                .execute(pool)
                .await;

                match result {
                    Ok(_) => {}
                    Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                        return Err(AppError::Conflict(
                            "A brand is already registered with this email".to_string(),
                        ));
                    }
                    Err(e) => return Err(AppError::DatabaseError(e)),
                }
            }
            BrandStorage::Memory(map) => {
                let mut map = map.write().await;
                if map.values().any(|existing| existing.email == record.email) {
                    return Err(AppError::Conflict(
                        "A brand is already registered with this email".to_string(),
                    ));
                }
                map.insert(record.id_unico.clone(), record.clone());
            }
        }

        tracing::info!(
            "Created brand {} ({}) in {} store",
            record.id_unico,
            record.company_name,
            self.backend_name()
        );
        Ok(record)
    }

    pub async fn get(&self, id_unico: &str) -> Result<Option<BrandRecord>, AppError> {
        match self {
            BrandStorage::Postgres(pool) => {
                let row = sqlx::query_as::<_, BrandRow>(&format!(
                    "{} WHERE id_unico = $1",
                    SELECT_BRAND
                ))
                .bind(id_unico)
                .fetch_optional(pool)
                .await?;
                Ok(row.map(BrandRecord::from))
            }
            BrandStorage::Memory(map) => Ok(map.read().await.get(id_unico).cloned()),
        }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<BrandRecord>, AppError> {
        let email = email.trim().to_lowercase();
        match self {
            BrandStorage::Postgres(pool) => {
                let row = sqlx::query_as::<_, BrandRow>(&format!(
                    "{} WHERE lower(email) = $1 LIMIT 1",
                    SELECT_BRAND
                ))
                .bind(&email)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    tracing::error!("Database error in find_by_email: {:?}", e);
                    AppError::DatabaseError(e)
                })?;
                Ok(row.map(BrandRecord::from))
            }
            BrandStorage::Memory(map) => Ok(map
                .read()
                .await
                .values()
                .find(|record| record.email == email)
                .cloned()),
        }
    }

    /// Read-modify-write of one brand.
    ///
    /// `apply` runs against the stored record while it is locked (`FOR UPDATE`
    /// in Postgres, the map write lock in memory), so concurrent writers never
    /// replace each other's changes with a stale copy. Nothing is written when
    /// `apply` fails. `Ok(None)` for an unknown brand.
    pub async fn update<T, F>(
        &self,
        id_unico: &str,
        apply: F,
    ) -> Result<Option<(BrandRecord, T)>, AppError>
    where
        F: FnOnce(&mut BrandRecord) -> Result<T, AppError>,
    {
        let updated = match self {
            BrandStorage::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                let row = sqlx::query_as::<_, BrandRow>(&format!(
                    "{} WHERE id_unico = $1 FOR UPDATE",
                    SELECT_BRAND
                ))
                .bind(id_unico)
                .fetch_optional(&mut *tx)
                .await?;
                let Some(row) = row else {
                    return Ok(None);
                };

                let mut record = BrandRecord::from(row);
                let value = apply(&mut record)?;
                record.updated_at = Utc::now();

                sqlx::query(
                    r#"
                    UPDATE brands
                    SET company_name = $2,
                        password_hash = $3,
                        diagnostic_score = $4,
                        unlocked_mission = $5,
                        xp = $6,
                        level = $7,
                        strategy = $8,
                        onboarding_metadata = $9,
                        updated_at = $10
                    WHERE id_unico = $1
                    "#,
                )
                .bind(&record.id_unico)
                .bind(&record.company_name)
                .bind(&record.password_hash)
                .bind(record.diagnostic_score)
                .bind(record.unlocked_mission.map(|rank| rank.as_str()))
                .bind(record.xp)
                .bind(&record.level)
                .bind(record.strategy_storage_string())
                .bind(record.onboarding_metadata.to_storage_string())
                .bind(record.updated_at)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                (record, value)
            }
            BrandStorage::Memory(map) => {
                let mut map = map.write().await;
                let Some(slot) = map.get_mut(id_unico) else {
                    return Ok(None);
                };

                let mut record = slot.clone();
                let value = apply(&mut record)?;
                record.updated_at = Utc::now();
                *slot = record.clone();
                (record, value)
            }
        };

        tracing::debug!("Updated brand {}", id_unico);
        Ok(Some(updated))
    }
}
