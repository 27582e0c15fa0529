//! Password hashing, registration and the login gate.

use crate::db_storage::BrandStorage;
use crate::errors::AppError;
use crate::metadata::OnboardingMetadata;
use crate::models::{BrandRecord, LoginRequest, NewBrand, RegisterRequest};
use regex::Regex;
use scrypt::Params;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use uuid::Uuid;

const HASH_SCHEME: &str = "scrypt";
const SALTED_SHA256_SCHEME: &str = "sha256";
const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const KEY_LEN: usize = 32;
// Upper bounds accepted from stored hashes
const MAX_LOG_N: u8 = 17;
const MAX_R: u32 = 8;
const MAX_P: u32 = 4;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hashes a password as `scrypt$<log_n>$<r>$<p>$<salt-hex>$<key-hex>`.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = hex::encode(Uuid::new_v4().as_bytes());
    let key = derive_key(password, &salt, SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P)?;
    Ok(format!(
        "{}${}${}${}${}${}",
        HASH_SCHEME, SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, salt, key
    ))
}

fn derive_key(password: &str, salt: &str, log_n: u8, r: u32, p: u32) -> Result<String, AppError> {
    let params = Params::new(log_n, r, p, KEY_LEN)
        .map_err(|e| AppError::InternalError(format!("Invalid scrypt parameters: {}", e)))?;
    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut key)
        .map_err(|e| AppError::InternalError(format!("scrypt failed: {}", e)))?;
    Ok(hex::encode(key))
}

/// Verifies against an scrypt hash, an older salted SHA-256 hash, or a
/// legacy bare SHA-256 hex digest.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parts: Vec<&str> = stored_hash.split('$').collect();
    match parts.as_slice() {
        [HASH_SCHEME, log_n, r, p, salt, key] => {
            let (Ok(log_n), Ok(r), Ok(p)) =
                (log_n.parse::<u8>(), r.parse::<u32>(), p.parse::<u32>())
            else {
                tracing::warn!("Stored scrypt hash has unreadable parameters");
                return false;
            };
            if log_n > MAX_LOG_N || r > MAX_R || p > MAX_P {
                tracing::warn!("Stored scrypt hash exceeds the cost limits");
                return false;
            }
            match derive_key(password, salt, log_n, r, p) {
                Ok(derived) => constant_time_compare(&derived, key),
                Err(e) => {
                    tracing::warn!("Stored scrypt hash rejected: {}", e);
                    false
                }
            }
        }
        [SALTED_SHA256_SCHEME, salt, digest] => {
            constant_time_compare(&salted_sha256(salt, password), digest)
        }
        [legacy] if legacy.len() == 64 => {
            let digest = hex::encode(Sha256::digest(password.as_bytes()));
            constant_time_compare(&digest, &legacy.to_lowercase())
        }
        _ => {
            tracing::warn!("Stored password hash has an unknown format");
            false
        }
    }
}

/// Whether a stored hash predates the current scrypt parameters.
pub fn needs_rehash(stored_hash: &str) -> bool {
    let current = format!("{}${}${}${}$", HASH_SCHEME, SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P);
    !stored_hash.starts_with(&current)
}

fn salted_sha256(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Runs key derivation off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::InternalError(format!("Password task failed: {}", e)))
}

/// Constant-time string comparison
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Simplified RFC 5322 check: local@domain.tld
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("email regex is valid")
    });
    email.len() >= 5 && regex.is_match(email)
}

fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(message.to_string()))
}

/// Creates the brand record at registration time. The mission stays locked
/// until the first approved payment.
pub async fn register(
    storage: &BrandStorage,
    request: RegisterRequest,
) -> Result<BrandRecord, AppError> {
    let company_name = required(&request.company_name, "companyName is required")?;
    let email = required(&request.email, "email is required")?;
    // Passwords are not trimmed
    let password = request
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("password is required".to_string()))?;

    if !is_valid_email(email) {
        return Err(AppError::BadRequest("email is not valid".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must have at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let onboarding_metadata = request
        .onboarding_metadata
        .map(OnboardingMetadata::from_value)
        .unwrap_or_default();

    let owned = password.to_string();
    let password_hash = blocking(move || hash_password(&owned)).await??;

    storage
        .create(NewBrand {
            company_name: company_name.to_string(),
            email: email.to_string(),
            password_hash,
            diagnostic_score: request.diagnostic_score,
            onboarding_metadata,
        })
        .await
}

/// Checks credentials and the payment gate.
pub async fn login(storage: &BrandStorage, request: LoginRequest) -> Result<BrandRecord, AppError> {
    let email = required(&request.email, "email and password are required")?;
    let password = request
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("email and password are required".to_string()))?;

    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let record = storage.find_by_email(email).await?.ok_or_else(invalid)?;
    let (candidate, stored) = (password.to_string(), record.password_hash.clone());
    if !blocking(move || verify_password(&candidate, &stored)).await? {
        return Err(invalid());
    }

    let record = if needs_rehash(&record.password_hash) {
        upgrade_hash(storage, record, password).await
    } else {
        record
    };

    if record.unlocked_mission.is_none() {
        tracing::info!("Login blocked for {}: payment pending", record.id_unico);
        return Err(AppError::Forbidden(
            "Payment pending: no mission unlocked yet".to_string(),
        ));
    }

    tracing::info!("Brand {} logged in", record.id_unico);
    Ok(record)
}

/// Re-hashes a verified password with the current scheme. Failures keep the
/// old hash and only log.
async fn upgrade_hash(storage: &BrandStorage, record: BrandRecord, password: &str) -> BrandRecord {
    let owned = password.to_string();
    let new_hash = match blocking(move || hash_password(&owned)).await {
        Ok(Ok(hash)) => hash,
        Ok(Err(e)) | Err(e) => {
            tracing::warn!("Could not re-hash password for {}: {}", record.id_unico, e);
            return record;
        }
    };

    let old_hash = record.password_hash.clone();
    let updated = storage
        .update(&record.id_unico, |stored| {
            // Skip if the password changed since it was verified
            if stored.password_hash == old_hash {
                stored.password_hash = new_hash;
            }
            Ok(())
        })
        .await;

    match updated {
        Ok(Some((upgraded, ()))) => {
            tracing::info!("Upgraded password hash for {}", upgraded.id_unico);
            upgraded
        }
        Ok(None) => record,
        Err(e) => {
            tracing::warn!("Could not store re-hashed password for {}: {}", record.id_unico, e);
            record
        }
    }
}
