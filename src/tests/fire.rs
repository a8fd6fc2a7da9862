use axum::http::StatusCode;
use chrono::Duration;
use chrono::Utc;
use uuid::Uuid;

use crate::links::LinkKind;
use crate::storage::CreateLinkValues;
use crate::storage::Storage;
use crate::tests::helper;

#[tokio::test]
async fn test_fire_link_expired() {
    let (mut app, storage) = helper::setup_test_app();

    let owner_id = Uuid::new_v4();
    let access_token = helper::access_token(&owner_id);

    // expired links can not be created, so go around the API
    let kind = LinkKind::Fire {
        expires_at: Utc::now() - Duration::minutes(5),
    };
    storage
        .create_link(&CreateLinkValues {
            code: "burnt",
            destination: "https://www.example.com/",
            owner_id: Some(&owner_id),
            kind: &kind,
            qr_code: None,
        })
        .await
        .unwrap();

    let (status_code, location, body) = helper::root(&mut app, "burnt").await;
    assert_eq!(StatusCode::GONE, status_code);
    assert_eq!(None, location);
    assert!(body.contains("expired"));

    // expired visits still count
    let (_, detail) = helper::single_link(&mut app, &access_token, "burnt").await;
    let (link, clicks) = detail.unwrap();
    assert_eq!("fire", link.variant);
    assert_eq!(1, link.click_count);
    assert_eq!(1, clicks.len());

    let (status_code, url, error) = helper::maybe_unlock(&mut app, "burnt", "anything").await;
    assert_eq!(StatusCode::GONE, status_code);
    assert_eq!(None, url);
    assert_eq!(Some("Link has expired".to_string()), error);
}
