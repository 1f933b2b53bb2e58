#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, App};
use artvault::auth::Role;
use artvault::config;
use artvault::error::ErrorCode;
use artvault::interaction::InteractionService;
use artvault::models::{Blog, NewBlog};
use artvault::repo::BlogRepo;
use serde_json::Value;
use serial_test::serial;
use uuid::Uuid;

async fn seed_blog(h: &common::Harness) -> Blog {
    h.repo
        .create_blog(
            Uuid::new_v4(),
            NewBlog {
                title: "Heartable post".into(),
                content: "Some content that is long enough".into(),
                image: "https://img.example.com/cover.png".into(),
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn counter_tracks_distinct_hearts() {
    let h = common::harness();
    let blog = seed_blog(&h).await;
    let svc = InteractionService::new(&h.repo);
    let id = blog.id.to_string();

    let fans: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    for fan in &fans {
        let change = svc.record_heart(*fan, &id).await.unwrap();
        assert!(change.changed);
    }
    // repeats change nothing
    let again = svc.record_heart(fans[0], &id).await.unwrap();
    assert!(!again.changed);
    assert_eq!(again.heart_count, 5);

    for fan in &fans[..2] {
        assert!(svc.remove_heart(*fan, &id).await.unwrap().changed);
    }
    let change = svc.remove_heart(fans[0], &id).await.unwrap();
    assert!(!change.changed);
    assert_eq!(change.heart_count, 3);
    assert_eq!(h.repo.get_blog(blog.id).await.unwrap().heart_count, 3);

    assert!(svc.state(fans[4], &id).await.unwrap().hearted);
    assert!(!svc.state(fans[0], &id).await.unwrap().hearted);
}

#[tokio::test]
async fn removing_without_a_heart_never_goes_negative() {
    let h = common::harness();
    let blog = seed_blog(&h).await;
    let svc = InteractionService::new(&h.repo);
    let change = svc.remove_heart(Uuid::new_v4(), &blog.id.to_string()).await.unwrap();
    assert_eq!(change.heart_count, 0);
    assert!(!change.changed);
}

#[tokio::test]
async fn concurrent_hearts_from_one_user_count_once() {
    let h = common::harness();
    let blog = seed_blog(&h).await;
    let fan = Uuid::new_v4();
    let id = blog.id.to_string();
    let svc = InteractionService::new(&h.repo);
    let (a, b) = tokio::join!(svc.record_heart(fan, &id), svc.record_heart(fan, &id));
    assert!(a.unwrap().changed ^ b.unwrap().changed);
    assert_eq!(h.repo.get_blog(blog.id).await.unwrap().heart_count, 1);
}

#[tokio::test]
async fn unknown_or_malformed_blog() {
    let h = common::harness();
    let svc = InteractionService::new(&h.repo);
    let err = svc.record_heart(Uuid::new_v4(), &Uuid::new_v4().to_string()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BlogNotFound);
    let err = svc.record_heart(Uuid::new_v4(), "42").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidBlogId);
}

#[actix_web::test]
#[serial]
async fn hearts_over_http() {
    let h = common::harness();
    let blog = seed_blog(&h).await;
    let app = test::init_service(App::new().app_data(h.data()).configure(config)).await;
    let fan = Uuid::new_v4();
    let uri = format!("/api/interaction/blog/{}/heart", blog.id);

    let req = test::TestRequest::post().uri(&uri).insert_header(common::bearer(fan, &[Role::User])).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["heartCount"], 1);

    let req = test::TestRequest::post().uri(&uri).insert_header(common::bearer(fan, &[Role::User])).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/api/interaction/user/blog/{}", blog.id))
        .insert_header(common::bearer(fan, &[Role::User]))
        .to_request();
    let v: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(v["hearted"], true);

    let req = test::TestRequest::delete().uri(&uri).insert_header(common::bearer(fan, &[Role::User])).to_request();
    let v: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(v["heartCount"], 0);
    assert_eq!(v["hearted"], false);

    let req = test::TestRequest::post().uri(&uri).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial]
async fn store_outage_is_a_database_error() {
    let h = common::harness();
    let blog = seed_blog(&h).await;
    h.repo.set_unavailable(true);
    let app = test::init_service(App::new().app_data(h.data()).configure(config)).await;
    let req = test::TestRequest::post()
        .uri(&format!("/api/interaction/blog/{}/heart", blog.id))
        .insert_header(common::bearer(Uuid::new_v4(), &[Role::User]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["errorCode"], "database_error");
}
