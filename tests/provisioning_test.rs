mod common;

use anyhow::Result;
use bursar::application::{AppError, ValidationError};
use bursar::domain::{ProfileUpdate, Role};
use common::{StandardCatalog, count_rows, test_service};
use futures::future::join_all;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_provision_creates_account_profile_and_default_enrollments() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let catalog = StandardCatalog::create(&service).await?;

    let id = service.provision("Ada", "ada@x.com", "pw").await?;

    let account = service.repository().get_account(id).await?.unwrap();
    assert_eq!(account.name, "Ada");
    assert_eq!(account.role, Role::Student);
    assert_ne!(account.password_hash, "pw", "Plaintext must never be stored");

    let profile = service.repository().get_profile(id).await?.unwrap();
    assert!(profile.is_shell());

    // Defaults are the first two courses by code
    let enrollments = service.list_enrollments(id).await?;
    let mut enrolled: Vec<_> = enrollments.iter().map(|e| e.course_id).collect();
    enrolled.sort();
    let mut expected = vec![catalog.algorithms, catalog.calculus];
    expected.sort();
    assert_eq!(enrolled, expected);

    assert_eq!(count_rows(&service, "accounts", None).await?, 1);
    assert_eq!(count_rows(&service, "profiles", None).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_provision_with_empty_catalog_enrolls_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let id = service.provision("Ada", "ada@x.com", "pw").await?;

    assert!(service.list_enrollments(id).await?.is_empty());
    assert_eq!(count_rows(&service, "profiles", Some(id)).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_email_fails_and_creates_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardCatalog::create(&service).await?;

    service.provision("A", "a@x.com", "pw").await?;
    let result = service.provision("B", "a@x.com", "pw2").await;

    assert!(matches!(result, Err(AppError::DuplicateEmail(_))));
    assert_eq!(result.unwrap_err().reason(), "duplicate_email");
    assert_eq!(service.repository().count_accounts_with_email("a@x.com").await?, 1);
    assert_eq!(count_rows(&service, "accounts", None).await?, 1);
    assert_eq!(count_rows(&service, "profiles", None).await?, 1);
    assert_eq!(count_rows(&service, "enrollments", None).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_email_uniqueness_ignores_case_and_whitespace() -> Result<()> {
    let (service, _temp) = test_service().await?;

    service.provision("A", "a@x.com", "pw").await?;
    let result = service.provision("B", "  A@X.com ", "pw").await;

    assert!(matches!(result, Err(AppError::DuplicateEmail(_))));
    Ok(())
}

#[tokio::test]
async fn test_missing_fields_are_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let cases = [
        ("", "a@x.com", "pw", "name"),
        ("A", "   ", "pw", "email"),
        ("A", "a@x.com", "", "password"),
    ];
    for (name, email, password, field) in cases {
        let result = service.provision(name, email, password).await;
        match result {
            Err(AppError::Validation(ValidationError::MissingField(missing))) => {
                assert_eq!(missing, field)
            }
            other => panic!("Expected missing {}, got {:?}", field, other),
        }
    }

    assert_eq!(count_rows(&service, "accounts", None).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_failure_after_account_insert_rolls_back_everything() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardCatalog::create(&service).await?;

    // Break the profile step so it fails after the account row was written
    sqlx::query("DROP TABLE profiles")
        .execute(service.repository().pool())
        .await?;

    let result = service.provision("Ada", "ada@x.com", "pw").await;

    assert!(matches!(result, Err(AppError::Database(_))));
    assert_eq!(count_rows(&service, "accounts", None).await?, 0);
    assert_eq!(count_rows(&service, "enrollments", None).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_provisioning_with_same_email() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardCatalog::create(&service).await?;

    let attempts = (0..4).map(|i| {
        let service = service.clone();
        async move {
            service
                .provision(&format!("Student {}", i), "same@x.com", "pw")
                .await
        }
    });
    let results = join_all(attempts).await;

    let created = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::DuplicateEmail(_))))
        .count();
    assert_eq!(created, 1);
    assert_eq!(duplicates, 3);
    assert_eq!(count_rows(&service, "accounts", None).await?, 1);
    assert_eq!(count_rows(&service, "profiles", None).await?, 1);
    assert_eq!(count_rows(&service, "enrollments", None).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_login_with_correct_and_wrong_password() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let id = service.provision("Ada", "ada@x.com", "s3cret").await?;

    let summary = service.login("ADA@x.com", "s3cret").await?;
    assert_eq!(summary.id, id);
    assert_eq!(summary.name, "Ada");

    let wrong = service.login("ada@x.com", "nope").await;
    assert!(matches!(wrong, Err(AppError::InvalidCredentials)));

    let unknown = service.login("bob@x.com", "s3cret").await;
    assert!(matches!(unknown, Err(AppError::InvalidCredentials)));
    Ok(())
}

#[tokio::test]
async fn test_profile_update_upserts_single_row() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let id = service.provision("Ada", "ada@x.com", "pw").await?;

    let update = ProfileUpdate {
        registration_no: Some("REG-001".into()),
        department: Some("Mathematics".into()),
        year: Some(2),
        gpa: Some(3.8),
        ..Default::default()
    };
    service.update_profile(id, update.clone()).await?;
    service.update_profile(id, update).await?;

    let profile = service.repository().get_profile(id).await?.unwrap();
    assert_eq!(profile.registration_no.as_deref(), Some("REG-001"));
    assert_eq!(profile.year, Some(2));
    assert_eq!(count_rows(&service, "profiles", Some(id)).await?, 1);

    // A missing profile row is inserted rather than updated
    sqlx::query("DELETE FROM profiles WHERE account_id = ?")
        .bind(id.to_string())
        .execute(service.repository().pool())
        .await?;
    service
        .update_profile(
            id,
            ProfileUpdate {
                phone: Some("555-0100".into()),
                ..Default::default()
            },
        )
        .await?;
    let profile = service.repository().get_profile(id).await?.unwrap();
    assert_eq!(profile.phone.as_deref(), Some("555-0100"));
    assert_eq!(profile.registration_no, None);
    Ok(())
}

#[tokio::test]
async fn test_profile_update_for_unknown_account() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service
        .update_profile(uuid::Uuid::new_v4(), ProfileUpdate::default())
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(count_rows(&service, "profiles", None).await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_provisioning_cut_short_leaves_no_partial_rows() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardCatalog::create(&service).await?;

    let attempts = (0..30u64).map(|i| {
        let service = service.clone();
        async move {
            let email = format!("student{}@x.com", i);
            timeout(
                Duration::from_millis(i * 4),
                service.provision("Student", &email, "pw"),
            )
            .await
        }
    });
    let results = join_all(attempts).await;

    let completed = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count() as i64;
    let accounts = count_rows(&service, "accounts", None).await?;

    // A future dropped while its commit is in flight may still have committed
    assert!(accounts >= completed);
    assert_eq!(count_rows(&service, "profiles", None).await?, accounts);
    assert_eq!(count_rows(&service, "enrollments", None).await?, accounts * 2);

    let report = service.check_integrity().await?;
    assert!(report.is_valid);
    assert_eq!(report.accounts_without_profile, 0);

    // The store is still usable afterwards
    service.provision("After", "after@x.com", "pw").await?;
    Ok(())
}

#[tokio::test]
async fn test_store_only_accepts_student_role() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = sqlx::query(
        "INSERT INTO accounts (id, name, email, password_hash, role, created_at) \
         VALUES ('x', 'Root', 'root@x.com', 'hash', 'staff', '2024-01-01T00:00:00Z')",
    )
    .execute(service.repository().pool())
    .await;

    assert!(result.is_err());
    assert_eq!(count_rows(&service, "accounts", None).await?, 0);
    Ok(())
}
