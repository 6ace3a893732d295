//! Local stand-in for the Telegram Bot API

use axum::extract::{Multipart, State};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use resibox::telegram::TelegramClient;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOKEN: &str = "TEST";
pub const CHAT_ID: &str = "42";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPhoto {
    pub chat_id: String,
    pub caption: String,
    pub file_name: String,
    pub bytes: usize,
}

#[derive(Clone, Default)]
pub struct TelegramStub {
    pub messages: Arc<Mutex<Vec<(String, String)>>>,
    pub photos: Arc<Mutex<Vec<SentPhoto>>>,
    pub updates: Arc<Mutex<VecDeque<Value>>>,
    /// Answer every call with `ok: false`
    pub reject: bool,
}

impl TelegramStub {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn push_update(&self, update_id: i64, text: &str) {
        self.updates.lock().unwrap().push_back(json!({
            "update_id": update_id,
            "message": { "message_id": update_id, "chat": { "id": 42 }, "text": text }
        }));
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(&format!("/bot{}/sendMessage", TOKEN), post(send_message))
            .route(&format!("/bot{}/sendPhoto", TOKEN), post(send_photo))
            .route(&format!("/bot{}/getUpdates", TOKEN), get(get_updates))
            .with_state(self.clone())
    }

    /// Start the stub, returning its API base URL
    pub async fn spawn(&self) -> String {
        let addr = super::spawn_stub(self.router()).await;
        format!("http://{}", addr)
    }

    pub fn client(api_base: &str) -> TelegramClient {
        TelegramClient::new(
            api_base,
            TOKEN,
            CHAT_ID,
            Duration::from_secs(5),
            Duration::from_secs(1),
        )
        .expect("telegram client")
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Wait until at least `count` messages arrived
    pub async fn wait_for_messages(&self, count: usize) -> Vec<String> {
        for _ in 0..100 {
            if self.messages.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.texts()
    }

    fn answer(&self, result: Value) -> Json<Value> {
        if self.reject {
            Json(json!({ "ok": false, "description": "Forbidden: bot was blocked by the user" }))
        } else {
            Json(json!({ "ok": true, "result": result }))
        }
    }
}

fn sent_message(text: &str) -> Value {
    json!({ "message_id": 1, "chat": { "id": 42 }, "text": text })
}

async fn send_message(
    State(stub): State<TelegramStub>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let chat_id = form.get("chat_id").cloned().unwrap_or_default();
    let text = form.get("text").cloned().unwrap_or_default();
    if !stub.reject {
        stub.messages.lock().unwrap().push((chat_id, text.clone()));
    }
    stub.answer(sent_message(&text))
}

async fn send_photo(State(stub): State<TelegramStub>, mut multipart: Multipart) -> Json<Value> {
    let mut photo = SentPhoto {
        chat_id: String::new(),
        caption: String::new(),
        file_name: String::new(),
        bytes: 0,
    };
    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name().unwrap_or_default().to_string().as_str() {
            "chat_id" => photo.chat_id = field.text().await.unwrap_or_default(),
            "caption" => photo.caption = field.text().await.unwrap_or_default(),
            "photo" => {
                photo.file_name = field.file_name().unwrap_or_default().to_string();
                photo.bytes = field.bytes().await.map(|b| b.len()).unwrap_or(0);
            }
            _ => {}
        }
    }
    if !stub.reject {
        stub.photos.lock().unwrap().push(photo);
    }
    stub.answer(json!({ "message_id": 2, "chat": { "id": 42 } }))
}

async fn get_updates(State(stub): State<TelegramStub>) -> Json<Value> {
    let pending: Vec<Value> = stub.updates.lock().unwrap().drain(..).collect();
    if pending.is_empty() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    stub.answer(Value::Array(pending))
}
