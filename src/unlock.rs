//! Mission-unlock reconciliation for payment notifications.

use crate::db_storage::BrandStorage;
use crate::errors::AppError;
use crate::models::MissionRank;
use crate::payment_models::Payment;
use serde::Serialize;

/// Next unlocked-mission marker after purchasing `purchased`.
///
/// Never regresses, and `All` is terminal. The flag reports whether the
/// marker moved.
pub fn advance_rank(
    current: Option<MissionRank>,
    purchased: MissionRank,
) -> (MissionRank, bool) {
    match current {
        Some(current) if current >= purchased => (current, false),
        _ => (purchased, true),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub id_unico: String,
    pub payment_status: String,
    pub unlocked_mission: Option<MissionRank>,
    pub advanced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Applied(ReconcileOutcome),
    Ignored(String),
}

/// Applies a payment to the brand it references.
///
/// Payment status is always merged into the metadata blob. Only approved
/// payments advance the unlocked mission. The rank is compared against the
/// stored record inside a locked update, so it never moves down.
pub async fn reconcile(
    storage: &BrandStorage,
    payment: &Payment,
) -> Result<Reconciliation, AppError> {
    let Some(id_unico) = payment.id_unico() else {
        tracing::warn!("Payment {} carries no brand reference", payment.id);
        return Ok(Reconciliation::Ignored(
            "payment has no brand reference".to_string(),
        ));
    };

    let Some(product) = payment.product() else {
        tracing::warn!("Payment {} carries no known product code", payment.id);
        return Ok(Reconciliation::Ignored(
            "payment has no known product".to_string(),
        ));
    };

    let updated = storage
        .update(id_unico, |record| {
            record.onboarding_metadata.record_payment(
                &payment.id,
                &payment.status,
                Some(product.as_str()),
            );

            if !payment.is_approved() {
                return Ok(false);
            }
            let (next, moved) = advance_rank(record.unlocked_mission, product);
            if moved {
                tracing::info!(
                    "Brand {} unlocked {} (was {:?})",
                    record.id_unico,
                    next,
                    record.unlocked_mission
                );
            }
            record.unlocked_mission = Some(next);
            Ok(moved)
        })
        .await?;

    let Some((record, advanced)) = updated else {
        tracing::warn!(
            "Payment {} references unknown brand {}",
            payment.id,
            id_unico
        );
        return Ok(Reconciliation::Ignored("brand not found".to_string()));
    };

    Ok(Reconciliation::Applied(ReconcileOutcome {
        id_unico: record.id_unico,
        payment_status: payment.status.clone(),
        unlocked_mission: record.unlocked_mission,
        advanced,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::OnboardingMetadata;
    use crate::models::NewBrand;
    use crate::payment_models::PaymentMetadata;

    fn payment(id_unico: &str, status: &str, product: &str) -> Payment {
        Payment {
            id: "555".to_string(),
            status: status.to_string(),
            status_detail: None,
            external_reference: Some(id_unico.to_string()),
            metadata: PaymentMetadata {
                id_unico: None,
                product_code: Some(product.to_string()),
            },
            transaction_amount: Some(97.0),
        }
    }

    async fn seeded() -> (BrandStorage, String) {
        let storage = BrandStorage::in_memory();
        let record = storage
            .create(NewBrand {
                company_name: "Ateliê Norte".to_string(),
                email: "norte@atelie.com".to_string(),
                password_hash: "hash".to_string(),
                diagnostic_score: None,
                onboarding_metadata: OnboardingMetadata::new(),
            })
            .await
            .unwrap();
        (storage, record.id_unico)
    }

    #[test]
    fn test_advance_rank_from_nothing() {
        assert_eq!(
            advance_rank(None, MissionRank::Mission1),
            (MissionRank::Mission1, true)
        );
    }

    #[test]
    fn test_advance_rank_never_regresses() {
        assert_eq!(
            advance_rank(Some(MissionRank::Mission4), MissionRank::Mission2),
            (MissionRank::Mission4, false)
        );
        assert_eq!(
            advance_rank(Some(MissionRank::All), MissionRank::Mission5),
            (MissionRank::All, false)
        );
        assert_eq!(
            advance_rank(Some(MissionRank::Mission3), MissionRank::Mission3),
            (MissionRank::Mission3, false)
        );
        assert_eq!(
            advance_rank(Some(MissionRank::Mission3), MissionRank::All),
            (MissionRank::All, true)
        );
    }

    #[tokio::test]
    async fn test_approved_payment_unlocks_mission() {
        let (storage, id) = seeded().await;

        let result = reconcile(&storage, &payment(&id, "approved", "mission-2"))
            .await
            .unwrap();

        let Reconciliation::Applied(outcome) = result else {
            panic!("expected applied reconciliation");
        };
        assert!(outcome.advanced);
        assert_eq!(outcome.unlocked_mission, Some(MissionRank::Mission2));

        let record = storage.get(&id).await.unwrap().unwrap();
        assert_eq!(record.unlocked_mission, Some(MissionRank::Mission2));
        assert_eq!(record.onboarding_metadata.checkout_status(), Some("approved"));
    }

    #[tokio::test]
    async fn test_pending_payment_only_updates_metadata() {
        let (storage, id) = seeded().await;

        let result = reconcile(&storage, &payment(&id, "pending", "mission-3"))
            .await
            .unwrap();

        let Reconciliation::Applied(outcome) = result else {
            panic!("expected applied reconciliation");
        };
        assert!(!outcome.advanced);
        assert_eq!(outcome.unlocked_mission, None);

        let record = storage.get(&id).await.unwrap().unwrap();
        assert_eq!(record.onboarding_metadata.checkout_status(), Some("pending"));
    }

    #[tokio::test]
    async fn test_lower_purchase_keeps_higher_rank() {
        let (storage, id) = seeded().await;
        reconcile(&storage, &payment(&id, "approved", "all"))
            .await
            .unwrap();
        reconcile(&storage, &payment(&id, "approved", "mission-1"))
            .await
            .unwrap();

        let record = storage.get(&id).await.unwrap().unwrap();
        assert_eq!(record.unlocked_mission, Some(MissionRank::All));
    }

    #[tokio::test]
    async fn test_unknown_brand_is_ignored() {
        let (storage, _) = seeded().await;
        let result = reconcile(&storage, &payment("ghost", "approved", "mission-1"))
            .await
            .unwrap();
        assert!(matches!(result, Reconciliation::Ignored(_)));
    }

    #[tokio::test]
    async fn test_missing_reference_is_ignored() {
        let (storage, _) = seeded().await;
        let mut orphan = payment("", "approved", "mission-1");
        orphan.external_reference = None;
        let result = reconcile(&storage, &orphan).await.unwrap();
        assert!(matches!(result, Reconciliation::Ignored(_)));
    }

    #[tokio::test]
    async fn test_unknown_product_is_ignored() {
        let (storage, id) = seeded().await;
        let result = reconcile(&storage, &payment(&id, "approved", "premium"))
            .await
            .unwrap();
        assert!(matches!(result, Reconciliation::Ignored(_)));

        let record = storage.get(&id).await.unwrap().unwrap();
        assert_eq!(record.unlocked_mission, None);
        assert_eq!(record.onboarding_metadata.checkout_status(), None);
    }

    #[tokio::test]
    async fn test_dashboard_save_after_approval_keeps_rank() {
        let (storage, id) = seeded().await;
        // Dashboard copy loaded before the payment lands
        let stale = storage.get(&id).await.unwrap().unwrap();
        assert_eq!(stale.unlocked_mission, None);

        reconcile(&storage, &payment(&id, "approved", "mission-3"))
            .await
            .unwrap();

        storage
            .update(&id, |record| {
                crate::handlers::apply_patch(
                    record,
                    crate::models::BrandPatch {
                        award_xp: Some(10),
                        ..Default::default()
                    },
                )
            })
            .await
            .unwrap()
            .unwrap();

        let record = storage.get(&id).await.unwrap().unwrap();
        assert_eq!(record.unlocked_mission, Some(MissionRank::Mission3));
        assert_eq!(record.onboarding_metadata.checkout_status(), Some("approved"));
        assert_eq!(record.xp, 10);
    }
}
