#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, App};
use artvault::auth::Role;
use artvault::config;
use artvault::error::{ApiError, ErrorCode};
use artvault::models::NewNotification;
use artvault::notification::{ListParams, NotificationService};
use artvault::realtime::{handle_event, ClientEvent, NotificationsData, ServerEvent};
use serde_json::Value;
use serial_test::serial;
use uuid::Uuid;

fn note(user: Uuid, title: &str) -> NewNotification {
    NewNotification { title: title.into(), content: Some("Somebody hearted your post".into()), user_id: user }
}

#[tokio::test]
async fn create_pushes_to_a_registered_connection() {
    let h = common::harness();
    let hub = &h.state.hub;
    let user = Uuid::new_v4();
    let (conn, mut rx) = hub.attach();
    assert!(hub.register(user, &conn));

    let svc = NotificationService::new(&h.repo, hub);
    let n = svc.create(note(user, "New heart")).await.unwrap();
    assert!(!n.is_read);

    let frame = rx.try_recv().unwrap();
    let v: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(v["event"], "notifications");
    assert_eq!(v["data"]["id"], n.id.to_string());
    assert_eq!(v["data"]["isRead"], false);
}

#[tokio::test]
async fn offline_recipient_still_gets_the_row() {
    let h = common::harness();
    let user = Uuid::new_v4();
    let svc = NotificationService::new(&h.repo, &h.state.hub);
    svc.create(note(user, "While you were away")).await.unwrap();
    let list = svc.list(user, &ListParams::default()).await.unwrap();
    assert_eq!(list.total, 1);
}

#[tokio::test]
async fn list_pages_newest_first_with_total() {
    let h = common::harness();
    let user = Uuid::new_v4();
    let svc = NotificationService::new(&h.repo, &h.state.hub);
    for i in 0..4 {
        svc.create(note(user, &format!("Notice {i}"))).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(3)).await;
    }
    svc.create(note(Uuid::new_v4(), "Someone else's")).await.unwrap();

    let page = svc.list(user, &ListParams { skip: Some(1), take: Some(2) }).await.unwrap();
    assert_eq!(page.total, 4);
    let titles: Vec<&str> = page.notifications.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["Notice 2", "Notice 1"]);

    // nonsense paging values fall back to everything
    let page = svc.list(user, &ListParams { skip: Some(-3), take: Some(0) }).await.unwrap();
    assert_eq!(page.notifications.len(), 4);
}

#[tokio::test]
async fn mark_read_transitions_once_and_only_for_the_recipient() {
    let h = common::harness();
    let user = Uuid::new_v4();
    let svc = NotificationService::new(&h.repo, &h.state.hub);
    let n = svc.create(note(user, "Read me")).await.unwrap();
    let id = n.id.to_string();

    let err = svc.mark_read(Uuid::new_v4(), &id).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let first = svc.mark_read(user, &id).await.unwrap();
    assert!(first.transitioned);
    assert!(first.notification.is_read);
    let second = svc.mark_read(user, &id).await.unwrap();
    assert!(!second.transitioned);

    assert_eq!(svc.mark_read(user, "nope").await.unwrap_err().code(), ErrorCode::InvalidId);
    assert_eq!(
        svc.mark_read(user, &Uuid::new_v4().to_string()).await.unwrap_err().code(),
        ErrorCode::NotificationNotFound
    );
}

#[tokio::test]
async fn invalid_payload_is_rejected() {
    let h = common::harness();
    let svc = NotificationService::new(&h.repo, &h.state.hub);
    let err = svc.create(note(Uuid::new_v4(), "")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert_eq!(err.details().unwrap()[0].path, "title");
}

#[tokio::test]
async fn realtime_events_round_trip_through_the_hub() {
    let h = common::harness();
    let user = Uuid::new_v4();
    let (conn, mut rx) = h.state.hub.attach();

    let reply = handle_event(&h.state, &conn, ClientEvent::GetNotifications).await;
    assert!(matches!(reply, Some(ServerEvent::Error { .. })));

    let reply = handle_event(&h.state, &conn, ClientEvent::Register("not-a-uuid".into())).await;
    assert!(matches!(reply, Some(ServerEvent::Error { .. })));

    assert!(handle_event(&h.state, &conn, ClientEvent::Register(user.to_string())).await.is_none());
    assert_eq!(h.state.hub.user_for(&conn), Some(user));

    let reply = handle_event(&h.state, &conn, ClientEvent::CreateNotification(note(user, "Over the socket"))).await;
    let created = match reply {
        Some(ServerEvent::NotificationCreated(n)) => n,
        other => panic!("unexpected reply {other:?}"),
    };
    // the recipient is this very connection, so the push arrives too
    assert!(rx.try_recv().is_ok());

    match handle_event(&h.state, &conn, ClientEvent::GetNotifications).await {
        Some(ServerEvent::Notifications(NotificationsData::Many(list))) => {
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].id, created.id);
        }
        other => panic!("unexpected reply {other:?}"),
    }

    assert_eq!(h.state.hub.unregister(&conn), Some(user));
    assert_eq!(h.state.hub.connection_for(user), None);
}

#[::core::prelude::v1::test]
fn client_frames_parse() {
    let frame = r#"{"event":"register","data":"3f2c1a8e-0000-4000-8000-000000000001"}"#;
    assert!(matches!(serde_json::from_str::<ClientEvent>(frame).unwrap(), ClientEvent::Register(_)));
    let frame = r#"{"event":"getNotifications"}"#;
    assert!(matches!(serde_json::from_str::<ClientEvent>(frame).unwrap(), ClientEvent::GetNotifications));
}

#[actix_web::test]
#[serial]
async fn notifications_over_http() {
    let h = common::harness();
    let app = test::init_service(App::new().app_data(h.data()).configure(config)).await;
    let user = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri("/api/notification")
        .insert_header(common::bearer(Uuid::new_v4(), &[Role::User]))
        .set_json(serde_json::json!({ "title": "Hello there", "userId": user }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: Value = test::read_body_json(resp).await;
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/notification?skip=0&take=10")
        .insert_header(common::bearer(user, &[Role::User]))
        .to_request();
    let v: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(v["total"], 1);
    assert_eq!(v["notifications"][0]["id"], id);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/notification/{id}/read"))
        .insert_header(common::bearer(Uuid::new_v4(), &[Role::User]))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/notification/{id}/read"))
        .insert_header(common::bearer(user, &[Role::User]))
        .to_request();
    let v: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(v["transitioned"], true);
    assert_eq!(v["notification"]["isRead"], true);
}
