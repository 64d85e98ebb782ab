mod common;

use anyhow::Result;
use bursar::io::{Exporter, ImportOptions, Importer};
use common::{StandardCatalog, count_rows, test_service};
use std::io::Cursor;

#[tokio::test]
async fn test_import_courses() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let csv = "name,code,icon,instructor\n\
               Chemistry,CH101,flask,Dr. Curie\n\
               Biology,BI101,,\n";

    let result = Importer::new(&service)
        .import_courses_csv(Cursor::new(csv), ImportOptions::default())
        .await?;

    assert_eq!(result.imported, 2);
    assert!(result.errors.is_empty());

    let courses = service.list_courses().await?;
    let codes: Vec<_> = courses.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["BI101", "CH101"]);
    let biology = &courses[0];
    assert_eq!(biology.icon, None);
    assert_eq!(biology.instructor, None);
    Ok(())
}

#[tokio::test]
async fn test_import_courses_with_existing_codes() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardCatalog::create(&service).await?;
    let csv = "name,code,icon,instructor\n\
               Algorithms Again,CS101,,\n\
               Chemistry,CH101,,\n";

    let strict = Importer::new(&service)
        .import_courses_csv(Cursor::new(csv), ImportOptions::default())
        .await?;
    assert_eq!(strict.imported, 1);
    assert_eq!(strict.errors.len(), 1);
    assert_eq!(strict.errors[0].line, 2);

    let lenient = Importer::new(&service)
        .import_courses_csv(
            Cursor::new(csv),
            ImportOptions {
                skip_duplicates: true,
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(lenient.imported, 0);
    assert_eq!(lenient.skipped, 2);
    assert!(lenient.errors.is_empty());
    assert_eq!(service.list_courses().await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_import_ledgers() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let id = service.provision("A", "a@x.com", "pw").await?;
    let csv = "email,total_amount\n\
               A@X.com,1200.50\n\
               ghost@x.com,100\n\
               a@x.com,12.345\n";

    let result = Importer::new(&service)
        .import_ledgers_csv(Cursor::new(csv), ImportOptions::default())
        .await?;

    assert_eq!(result.imported, 1);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors[0].field.as_deref(), Some("email"));
    assert_eq!(result.errors[1].field.as_deref(), Some("total_amount"));

    let balance = service.balance(id).await?.unwrap();
    assert_eq!((balance.total, balance.paid, balance.overdue), (120050, 0, 120050));
    Ok(())
}

#[tokio::test]
async fn test_dry_run_writes_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.provision("A", "a@x.com", "pw").await?;
    let options = ImportOptions {
        dry_run: true,
        ..Default::default()
    };

    let courses = Importer::new(&service)
        .import_courses_csv(Cursor::new("name,code\nChemistry,CH101\n"), options.clone())
        .await?;
    let ledgers = Importer::new(&service)
        .import_ledgers_csv(Cursor::new("email,total_amount\na@x.com,10\n"), options)
        .await?;

    assert_eq!(courses.imported, 1);
    assert_eq!(ledgers.imported, 1);
    assert_eq!(count_rows(&service, "courses", None).await?, 0);
    assert_eq!(count_rows(&service, "ledgers", None).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_export_ledgers() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardCatalog::create(&service).await?;
    let id = common::student_with_ledger(&service, "a@x.com", 100000, 25050).await?;

    let mut csv = Vec::new();
    let count = Exporter::new(&service).export_ledgers_csv(&mut csv).await?;
    assert_eq!(count, 1);

    let text = String::from_utf8(csv)?;
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("account_id,total,paid,overdue"));
    assert_eq!(
        lines.next(),
        Some(format!("{},1000.00,250.50,749.50", id).as_str())
    );

    let mut json = Vec::new();
    let snapshot = Exporter::new(&service).export_json(&mut json).await?;
    assert_eq!(snapshot.courses.len(), 3);

    let value: serde_json::Value = serde_json::from_slice(&json)?;
    assert_eq!(value["ledgers"][0]["overdue"], 74950);
    Ok(())
}

#[tokio::test]
async fn test_dry_run_rejects_negative_totals() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.provision("A", "a@x.com", "pw").await?;
    let csv = "email,total_amount\na@x.com,-10.00\n";

    let checked = Importer::new(&service)
        .import_ledgers_csv(
            Cursor::new(csv),
            ImportOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .await?;
    let applied = Importer::new(&service)
        .import_ledgers_csv(Cursor::new(csv), ImportOptions::default())
        .await?;

    assert_eq!(checked.imported, 0);
    assert_eq!(checked.errors.len(), 1);
    assert_eq!(checked.errors[0].field.as_deref(), Some("total_amount"));
    assert_eq!(applied.imported, checked.imported);
    assert_eq!(applied.errors.len(), checked.errors.len());
    assert_eq!(count_rows(&service, "ledgers", None).await?, 0);
    Ok(())
}
