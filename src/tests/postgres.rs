use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use crate::storage::Storage;
use crate::tests::helper;

#[sqlx::test]
async fn test_link_lifecycle(pool: sqlx::PgPool) {
    let (mut app, storage) = helper::setup_postgres_test_app(pool).await;

    let access_token = helper::access_token(&Uuid::new_v4());

    let (status_code, link, _) = helper::maybe_create_link(
        &mut app,
        Some(&access_token),
        "https://www.example.com/",
        Some("promo"),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status_code);
    let link = link.unwrap();
    assert_eq!("custom", link.variant);
    assert_eq!("http://localhost:6000/promo", link.short_url);

    // the alias is taken
    let (status_code, _, error) =
        helper::maybe_create_link(&mut app, None, "https://www.example.com/", Some("promo"))
            .await;
    assert_eq!(StatusCode::CONFLICT, status_code);
    assert_eq!(Some("Custom alias is already in use".to_string()), error);

    let (status_code, location, _) = helper::root(&mut app, "promo").await;
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, status_code);
    assert_eq!(Some("https://www.example.com/".to_string()), location);

    helper::root_from_country(&mut app, "promo", Some("fr")).await;

    let (status_code, detail) = helper::single_link(&mut app, &access_token, "promo").await;
    assert_eq!(StatusCode::OK, status_code);
    let (link, clicks) = detail.unwrap();
    assert_eq!(2, link.click_count);
    assert_eq!(
        vec!["IN", "FR"],
        clicks
            .iter()
            .map(|click| click.country.as_str())
            .collect::<Vec<_>>()
    );

    let (_, page) = helper::list_links(&mut app, Some(&access_token), "?search=PRO").await;
    assert_eq!(1, page.unwrap().total);

    let (status_code, _) =
        helper::maybe_delete_link(&mut app, Some(&access_token), "promo").await;
    assert_eq!(StatusCode::NO_CONTENT, status_code);

    let (status_code, _, _) = helper::root(&mut app, "promo").await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);

    let stored = storage
        .find_single_link_by_code("promo")
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.active);
    assert_eq!(2, stored.click_count);

    let (status_code, summary) = helper::analytics(&mut app, Some(&access_token)).await;
    assert_eq!(StatusCode::OK, status_code);
    let summary = summary.unwrap();
    assert_eq!(json!(1), summary["totalLinks"]);
    assert_eq!(json!(0), summary["activeLinks"]);
    assert_eq!(json!(2), summary["totalClicks"]);
}

#[sqlx::test]
async fn test_location_link(pool: sqlx::PgPool) {
    let (mut app, _) = helper::setup_postgres_test_app(pool).await;

    let (status_code, link, _) = helper::maybe_create_location_link(
        &mut app,
        None,
        "https://www.example.com/",
        &[("in", "https://in.example.com/"), ("US", "https://us.example.com/")],
        Some("https://world.example.com/"),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status_code);
    let link = link.unwrap();

    let (_, location, _) = helper::root(&mut app, &link.code).await;
    assert_eq!(Some("https://in.example.com/".to_string()), location);

    let (_, location, _) = helper::root_from_country(&mut app, &link.code, Some("DE")).await;
    assert_eq!(Some("https://world.example.com/".to_string()), location);
}
