#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, App};
use artvault::auth::{Auth, Claims, Role, RoleSet};
use artvault::blog::BlogService;
use artvault::config;
use artvault::error::{ApiError, ErrorCode};
use artvault::models::{NewBlog, UpdateBlog};
use artvault::repo::{BlogRepo, InteractionRepo};
use serial_test::serial;
use uuid::Uuid;

fn actor(id: Uuid, roles: &[Role]) -> Auth {
    Auth(Claims { sub: id, exp: usize::MAX, roles: roles.iter().copied().collect::<RoleSet>() })
}

fn new_blog(title: &str) -> NewBlog {
    NewBlog {
        title: title.into(),
        content: "Some content that is long enough".into(),
        image: "https://img.example.com/cover.png".into(),
    }
}

#[tokio::test]
async fn create_persists_unpublished_with_author() {
    let h = common::harness();
    let svc = BlogService::new(&h.repo);
    let author = Uuid::new_v4();
    let blog = svc.create(author, new_blog("Hello world")).await.unwrap();
    assert!(!blog.published);
    assert_eq!(blog.user_id, author);
    assert_eq!(blog.heart_count, 0);
    let stored = h.repo.get_blog(blog.id).await.unwrap();
    assert_eq!(stored.title, "Hello world");
}

#[tokio::test]
async fn invalid_payload_lists_every_field_and_stores_nothing() {
    let h = common::harness();
    let svc = BlogService::new(&h.repo);
    let bad = NewBlog { title: "Hi".into(), content: "short".into(), image: "nope".into() };
    let err = svc.create(Uuid::new_v4(), bad).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidBlogData);
    let paths: Vec<&str> = err.details().unwrap().iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["content", "image", "title"]);
    assert!(h.repo.list_blogs().await.unwrap().is_empty());
}

#[tokio::test]
async fn stranger_cannot_update_or_delete() {
    let h = common::harness();
    let svc = BlogService::new(&h.repo);
    let owner = Uuid::new_v4();
    let blog = svc.create(owner, new_blog("Owner's post")).await.unwrap();
    let stranger = actor(Uuid::new_v4(), &[Role::User, Role::Artist]);

    let upd = UpdateBlog { title: Some("Hijacked title".into()), ..Default::default() };
    let err = svc.update(&blog.id.to_string(), &stranger, upd).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
    let err = svc.delete(&blog.id.to_string(), &stranger).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let stored = h.repo.get_blog(blog.id).await.unwrap();
    assert_eq!(stored.title, "Owner's post");
    assert_eq!(stored.updated_at, blog.updated_at);
}

#[tokio::test]
async fn owner_and_admin_may_mutate_partially() {
    let h = common::harness();
    let svc = BlogService::new(&h.repo);
    let owner = Uuid::new_v4();
    let blog = svc.create(owner, new_blog("Original title")).await.unwrap();

    let upd = UpdateBlog { published: Some(true), ..Default::default() };
    let updated = svc.update(&blog.id.to_string(), &actor(owner, &[Role::User]), upd).await.unwrap();
    assert!(updated.published);
    assert_eq!(updated.title, "Original title");
    assert_eq!(updated.content, blog.content);

    let admin = actor(Uuid::new_v4(), &[Role::Admin]);
    let upd = UpdateBlog { title: Some("Moderated title".into()), ..Default::default() };
    let updated = svc.update(&blog.id.to_string(), &admin, upd).await.unwrap();
    assert_eq!(updated.title, "Moderated title");
    assert!(updated.published);

    svc.delete(&blog.id.to_string(), &admin).await.unwrap();
    assert!(svc.get(&blog.id.to_string()).await.is_err());
}

#[tokio::test]
async fn get_distinguishes_malformed_from_missing() {
    let h = common::harness();
    let svc = BlogService::new(&h.repo);
    let err = svc.get("not-a-uuid").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidBlogId);
    let err = svc.get(&Uuid::new_v4().to_string()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BlogNotFound);
}

#[tokio::test]
async fn delete_takes_hearts_with_it() {
    let h = common::harness();
    let svc = BlogService::new(&h.repo);
    let owner = Uuid::new_v4();
    let blog = svc.create(owner, new_blog("Loved post")).await.unwrap();
    let fan = Uuid::new_v4();
    h.repo.add_heart(fan, blog.id).await.unwrap();
    svc.delete(&blog.id.to_string(), &actor(owner, &[Role::User])).await.unwrap();
    assert!(!h.repo.has_heart(fan, blog.id).await.unwrap());
}

#[tokio::test]
async fn last_edited_follows_updates() {
    let h = common::harness();
    let svc = BlogService::new(&h.repo);
    let author = Uuid::new_v4();
    let err = svc.last_edited(author).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BlogNotFound);

    let first = svc.create(author, new_blog("First post")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = svc.create(author, new_blog("Second post")).await.unwrap();
    assert_eq!(svc.last_edited(author).await.unwrap().id, second.id);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let upd = UpdateBlog { content: Some("Freshly edited content".into()), ..Default::default() };
    svc.update(&first.id.to_string(), &actor(author, &[Role::User]), upd).await.unwrap();
    assert_eq!(svc.last_edited(author).await.unwrap().id, first.id);
}

#[tokio::test]
async fn store_outage_surfaces_as_database_error() {
    let h = common::harness();
    h.repo.set_unavailable(true);
    let err = BlogService::new(&h.repo).list().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DatabaseError);
}

// ------------------------------------------------------------ HTTP

#[actix_web::test]
#[serial]
async fn blog_crud_over_http() {
    let h = common::harness();
    let app = test::init_service(App::new().app_data(h.data()).configure(config)).await;
    let owner = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri("/api/blog")
        .insert_header(common::bearer(owner, &[Role::User]))
        .set_json(common::blog_payload("Over the wire"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(created["published"], false);
    assert_eq!(created["status"], "INACTIVE");
    assert_eq!(created["userId"], owner.to_string());
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get().uri(&format!("/api/blog/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::put()
        .uri(&format!("/api/blog/{id}"))
        .insert_header(common::bearer(Uuid::new_v4(), &[Role::User]))
        .set_json(serde_json::json!({ "title": "Not my blog" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::put()
        .uri(&format!("/api/blog/{id}"))
        .insert_header(common::bearer(owner, &[Role::User]))
        .set_json(serde_json::json!({ "title": "Hey" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(v["errorCode"], "invalid_blog_data");
    assert_eq!(v["details"][0]["path"], "title");

    let req = test::TestRequest::get().uri("/api/blog/last-edited").insert_header(common::bearer(owner, &[Role::User])).to_request();
    let v: serde_json::Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(v["id"], id);

    let req = test::TestRequest::get().uri("/api/blog").to_request();
    let v: serde_json::Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(v.as_array().unwrap().len(), 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/blog/{id}"))
        .insert_header(common::bearer(owner, &[Role::User]))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get().uri(&format!("/api/blog/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let v: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(v["errorCode"], "blog_not_found");
}

#[actix_web::test]
#[serial]
async fn unauthenticated_update_never_reaches_the_store() {
    let h = common::harness();
    // any store access would fail with a 500
    h.repo.set_unavailable(true);
    let app = test::init_service(App::new().app_data(h.data()).configure(config)).await;
    let req = test::TestRequest::put()
        .uri(&format!("/api/blog/{}", Uuid::new_v4()))
        .set_json(serde_json::json!({ "title": "Sneaky edit" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial]
async fn malformed_json_uses_error_body() {
    let h = common::harness();
    let app = test::init_service(App::new().app_data(h.data()).configure(config)).await;
    let req = test::TestRequest::post()
        .uri("/api/blog")
        .insert_header(common::bearer(Uuid::new_v4(), &[Role::User]))
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(v["errorCode"], "bad_request");
    assert_eq!(v["statusCode"], 400);
}
