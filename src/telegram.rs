//! Telegram Bot API client
//!
//! Only the calls the drop box needs: sendPhoto, sendMessage and getUpdates.

use reqwest::multipart;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::TelegramConfig;
use crate::error::{Error, Result};

/// Envelope every Bot API method answers with
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub struct TelegramClient {
    http_client: reqwest::Client,
    /// `{api_base}/bot{token}`
    endpoint: String,
    chat_id: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(
        api_base: &str,
        bot_token: &str,
        chat_id: impl Into<String>,
        request_timeout: Duration,
        poll_timeout: Duration,
    ) -> Result<Self> {
        // Long polls hold the request open for poll_timeout
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout + poll_timeout)
            .build()
            .map_err(|e| Error::Notify(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
            chat_id: chat_id.into(),
            poll_timeout,
        })
    }

    /// Client for the configured bot, `None` when credentials are missing
    pub fn from_config(config: &TelegramConfig) -> Result<Option<Self>> {
        let Some((token, chat_id)) = config.credentials() else {
            return Ok(None);
        };
        Self::new(
            &config.api_base,
            token,
            chat_id,
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.poll_timeout_secs),
        )
        .map(Some)
    }

    /// Chat that receives upload notifications
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.endpoint, method)
    }

    async fn parse<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Notify(format!("{}: invalid response ({}): {}", method, status, e)))?;

        if !body.ok {
            return Err(Error::Notify(format!(
                "{}: {}",
                method,
                body.description.unwrap_or_else(|| status.to_string())
            )));
        }
        body.result
            .ok_or_else(|| Error::Notify(format!("{}: empty result", method)))
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<Message> {
        let params = [("chat_id", chat_id), ("text", text)];
        let response = self
            .http_client
            .post(self.method_url("sendMessage"))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Notify(format!("sendMessage: {}", e)))?;

        Self::parse("sendMessage", response).await
    }

    pub async fn send_photo(&self, chat_id: &str, photo: Vec<u8>, caption: &str) -> Result<Message> {
        let (file_name, mime) = photo_file_type(&photo);
        let part = multipart::Part::bytes(photo)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| Error::Notify(format!("sendPhoto: {}", e)))?;
        let form = multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", part);

        let response = self
            .http_client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Notify(format!("sendPhoto: {}", e)))?;

        Self::parse("sendPhoto", response).await
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let offset = offset.to_string();
        let timeout = self.poll_timeout.as_secs().to_string();
        let params = [
            ("offset", offset.as_str()),
            ("timeout", timeout.as_str()),
            ("allowed_updates", "[\"message\"]"),
        ];
        let response = self
            .http_client
            .get(self.method_url("getUpdates"))
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::Notify(format!("getUpdates: {}", e)))?;

        Self::parse("getUpdates", response).await
    }
}

/// Upload file name and MIME type for an encoded photo, JPEG when unknown
pub fn photo_file_type(photo: &[u8]) -> (String, &'static str) {
    match image::guess_format(photo) {
        Ok(format) => {
            let extension = format.extensions_str().first().copied().unwrap_or("jpg");
            (format!("photo.{}", extension), format.to_mime_type())
        }
        Err(_) => ("photo.jpg".to_string(), "image/jpeg"),
    }
}
