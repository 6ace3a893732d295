//! Telegram bot tests against local Bot API and ESP32 stand-ins

mod common;

use axum::Router;
use axum::routing::get;
use resibox::actuator::ActuatorClient;
use resibox::bot::{BotCommand, CommandDispatcher, HELP_TEXT};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::telegram_stub::{CHAT_ID, TelegramStub};
use common::*;

async fn esp32_url() -> String {
    let router = Router::new()
        .route("/open", get(|| async { "opened" }))
        .route("/close", get(|| async { "closed\n" }));
    format!("http://{}", spawn_stub(router).await)
}

async fn dispatcher(stub: &TelegramStub, actuator_url: &str) -> CommandDispatcher {
    let api_base = stub.spawn().await;
    CommandDispatcher::new(
        Arc::new(TelegramStub::client(&api_base)),
        Arc::new(ActuatorClient::new(actuator_url, Duration::from_secs(2)).unwrap()),
    )
}

#[tokio::test]
async fn open_acknowledges_then_reports_status() {
    let stub = TelegramStub::default();
    let bot = dispatcher(&stub, &esp32_url().await).await;

    bot.dispatch(BotCommand::Open, CHAT_ID).await.unwrap();

    assert_eq!(stub.texts(), vec!["Membuka box...", "Status: opened"]);
    let messages = stub.messages.lock().unwrap().clone();
    assert!(messages.iter().all(|(chat, _)| chat == CHAT_ID));
}

#[tokio::test]
async fn close_trims_actuator_status() {
    let stub = TelegramStub::default();
    let bot = dispatcher(&stub, &esp32_url().await).await;

    bot.dispatch(BotCommand::Close, CHAT_ID).await.unwrap();

    assert_eq!(stub.texts(), vec!["Menutup box...", "Status: closed"]);
}

#[tokio::test]
async fn unreachable_actuator_reports_error_status() {
    let stub = TelegramStub::default();
    let addr = unreachable_addr().await;
    let bot = dispatcher(&stub, &format!("http://{}", addr)).await;

    bot.dispatch(BotCommand::Open, CHAT_ID).await.unwrap();

    assert_eq!(stub.texts(), vec!["Membuka box...", "Status: Error"]);
}

#[tokio::test]
async fn start_sends_help_only() {
    let stub = TelegramStub::default();
    let bot = dispatcher(&stub, "http://127.0.0.1:9").await;

    bot.dispatch(BotCommand::Start, CHAT_ID).await.unwrap();

    assert_eq!(stub.texts(), vec![HELP_TEXT]);
}

#[tokio::test]
async fn rejected_reply_is_an_error() {
    let stub = TelegramStub::rejecting();
    let bot = dispatcher(&stub, "http://127.0.0.1:9").await;

    assert!(bot.dispatch(BotCommand::Start, CHAT_ID).await.is_err());
}

#[tokio::test]
async fn polling_loop_answers_commands_until_cancelled() {
    let stub = TelegramStub::default();
    stub.push_update(1, "hello there");
    stub.push_update(2, "/open");
    stub.push_update(3, "/start@resibox_bot");

    let bot = dispatcher(&stub, &esp32_url().await).await;
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(bot.run(shutdown.clone()));

    let texts = stub.wait_for_messages(3).await;
    assert_eq!(texts, vec!["Membuka box...", "Status: opened", HELP_TEXT]);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("bot did not stop")
        .unwrap();
}
