//! Stored image templates rendered in batches.

use anyhow::Result;
use eventdesk::access::GlobalRole;
use eventdesk::images::{Frame, ImageElement, ImageRecord, ImageTemplateSpec, TextStyle};
use eventdesk::repositories::ImageTemplateRepository;
use eventdesk::repositories::image_template::NewImageTemplate;
use serde_json::json;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{create_tenant, create_user, setup_context};

fn speaker_card() -> Vec<ImageElement> {
    vec![
        ImageElement::StaticImage {
            url: "https://cdn.test/background.png".to_string(),
            frame: Frame {
                x: 0,
                y: 0,
                width: 1200,
                height: 630,
            },
        },
        ImageElement::VariableImage {
            field: "photo".to_string(),
            frame: Frame {
                x: 40,
                y: 40,
                width: 200,
                height: 200,
            },
        },
        ImageElement::VariableText {
            field: "{{first_name}} {{last_name}}".to_string(),
            x: 280,
            y: 120,
            style: TextStyle::default(),
        },
    ]
}

#[tokio::test]
async fn batch_isolates_failed_records() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;
    let template = ImageTemplateRepository::new(&ctx.db)
        .create(NewImageTemplate {
            tenant_id: tenant.id,
            name: "Speaker card".to_string(),
            width: 1200,
            height: 630,
            background: Some("#101820".to_string()),
            elements: speaker_card(),
        })
        .await?;
    let spec = ImageTemplateSpec::try_from(&template)?;

    let records: Vec<ImageRecord> = (0..7)
        .map(|i| {
            let photo = if i == 2 || i == 5 {
                format!("https://cdn.test/broken-{i}.png")
            } else {
                format!("https://cdn.test/speaker-{i}.png")
            };
            ImageRecord {
                record_id: Uuid::new_v4(),
                fields: json!({"first_name": "Speaker", "last_name": i, "photo": photo}),
            }
        })
        .collect();
    let ids: Vec<Uuid> = records.iter().map(|r| r.record_id).collect();

    let results = ctx.state.images.generate_batch(spec, records).await;

    assert_eq!(results.len(), 7);
    assert_eq!(results.iter().map(|r| r.record_id).collect::<Vec<_>>(), ids);
    assert_eq!(results.iter().filter(|r| r.success).count(), 5);

    for index in [2, 5] {
        assert!(!results[index].success);
        assert!(results[index].image.is_none());
        assert!(
            results[index]
                .error
                .as_deref()
                .unwrap_or_default()
                .contains("broken")
        );
    }

    let rendered = results[0].image.as_ref().unwrap();
    assert_eq!((rendered.width, rendered.height), (1200, 630));
    assert!(rendered.svg.contains("Speaker 0"));
    assert!(rendered.svg.contains("data:image/png;base64,"));
    assert_eq!(rendered.checksum.len(), 64);
    Ok(())
}

#[tokio::test]
async fn missing_image_field_fails_only_that_record() -> Result<()> {
    let ctx = setup_context().await?;
    let spec = ImageTemplateSpec {
        width: 400,
        height: 400,
        background: None,
        elements: speaker_card(),
    };
    let records = vec![
        ImageRecord {
            record_id: Uuid::new_v4(),
            fields: json!({"first_name": "Ana", "last_name": "Lima", "photo": "https://cdn.test/ana.png"}),
        },
        ImageRecord {
            record_id: Uuid::new_v4(),
            fields: json!({"first_name": "Bo"}),
        },
    ];

    let results = ctx.state.images.generate_batch(spec, records).await;
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[1].error.as_deref().unwrap_or_default().contains("photo"));
    Ok(())
}

#[tokio::test]
async fn invalid_elements_are_rejected_on_create() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;

    let result = ImageTemplateRepository::new(&ctx.db)
        .create(NewImageTemplate {
            tenant_id: tenant.id,
            name: "Broken".to_string(),
            width: 100,
            height: 100,
            background: None,
            elements: vec![ImageElement::VariableImage {
                field: "photo".to_string(),
                frame: Frame {
                    x: 0,
                    y: 0,
                    width: 0,
                    height: 10,
                },
            }],
        })
        .await;
    assert!(result.is_err());
    Ok(())
}
