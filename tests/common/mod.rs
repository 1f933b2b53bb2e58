#![allow(dead_code)]

use actix_web::web;
use artvault::auth::{create_jwt, Role, RoleSet};
use artvault::repo::inmem::InMemRepo;
use artvault::storage::{object_key, ObjectStore, ObjectStoreError, StoredObject};
use artvault::AppState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret-must-be-32-bytes-long!!";

pub fn setup_env() {
    std::env::set_var("JWT_SECRET", TEST_SECRET);
}

pub fn token(user: Uuid, roles: &[Role]) -> String {
    create_jwt(user, roles.iter().copied().collect::<RoleSet>()).unwrap()
}

pub fn bearer(user: Uuid, roles: &[Role]) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token(user, roles)))
}

// ---------------- In-memory mock ObjectStore (tests only) ----------------
#[derive(Default)]
pub struct MockObjectStore {
    pub objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub fail: bool,
}

#[async_trait::async_trait]
impl ObjectStore for MockObjectStore {
    async fn put(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<StoredObject, ObjectStoreError> {
        if self.fail {
            return Err(ObjectStoreError::Other("bucket offline".into()));
        }
        let key = object_key("uploads", hash);
        self.objects.lock().unwrap().entry(key.clone()).or_insert_with(|| (bytes.to_vec(), mime.to_string()));
        Ok(StoredObject { url: format!("http://files.test/{key}"), public_id: key })
    }
}

pub struct Harness {
    pub repo: InMemRepo,
    pub store: Arc<MockObjectStore>,
    pub state: AppState,
}

pub fn harness() -> Harness {
    harness_with_store(MockObjectStore::default())
}

pub fn harness_with_store(store: MockObjectStore) -> Harness {
    setup_env();
    let repo = InMemRepo::new();
    let store = Arc::new(store);
    let state = AppState::new(Arc::new(repo.clone()), store.clone());
    Harness { repo, store, state }
}

impl Harness {
    pub fn data(&self) -> web::Data<AppState> {
        web::Data::new(self.state.clone())
    }
}

pub fn blog_payload(title: &str) -> serde_json::Value {
    serde_json::json!({
        "title": title,
        "content": "Some content that is long enough",
        "image": "https://img.example.com/cover.png"
    })
}

// Minimal 1x1 PNG
pub fn sample_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
        0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
        0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
        0x42, 0x60, 0x82,
    ]
}

/// Multipart body with a `file` part plus optional text parts.
pub fn multipart(file: Option<&[u8]>, fields: &[(&str, &str)]) -> (String, Vec<u8>) {
    let boundary = "----artvault-test-boundary";
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    if let Some(bytes) = file {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
