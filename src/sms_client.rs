use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use std::time;

use crate::domain::phone_number::PhoneNumber;
use crate::domain::ChannelType;
use crate::notifier::{DeliveryOutcome, Notifier};

const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(10);
// The message From/To pair violates a blacklist rule: the recipient replied STOP.
const PERMANENT_REJECTION_CODES: [u32; 1] = [21610];

pub struct SmsClient {
    http_client: Client,
    base_url: String,
    account_sid: String,
    sender: PhoneNumber,
    auth_token: Secret<String>,
}

#[derive(serde::Serialize)]
struct SendSmsForm<'a> {
    #[serde(rename = "To")]
    to: &'a str,
    #[serde(rename = "From")]
    from: &'a str,
    #[serde(rename = "Body")]
    body: &'a str,
}

#[derive(serde::Deserialize)]
struct ProviderErrorBody {
    code: u32,
    message: String,
}

#[derive(thiserror::Error)]
pub enum SmsError {
    #[error("The provider rejected the recipient permanently (code {code}): {message}")]
    Rejected { code: u32, message: String },
    #[error("The provider answered with status {0}.")]
    Status(StatusCode),
    #[error("Failed to send the request to the SMS provider.")]
    Request(#[from] reqwest::Error),
}

impl std::fmt::Debug for SmsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmsError::Request(err) => write!(f, "{}\nCaused by:\n\t{}", self, err),
            _ => write!(f, "{}", self),
        }
    }
}

impl SmsClient {
    pub fn new(
        base_url: String,
        account_sid: String,
        sender: PhoneNumber,
        auth_token: Secret<String>,
        timeout: Option<time::Duration>,
    ) -> Result<SmsClient, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()?;

        Ok(SmsClient {
            http_client,
            base_url,
            account_sid,
            sender,
            auth_token,
        })
    }

    #[tracing::instrument(name = "Send an SMS", skip(self, recipient, body))]
    pub async fn send_sms(&self, recipient: &PhoneNumber, body: &str) -> Result<(), SmsError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        let form = SendSmsForm {
            to: recipient.as_ref(),
            from: self.sender.as_ref(),
            body,
        };

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // Error bodies carry a provider code that tells permanent rejections apart.
        match response.json::<ProviderErrorBody>().await {
            Ok(error) if PERMANENT_REJECTION_CODES.contains(&error.code) => {
                Err(SmsError::Rejected {
                    code: error.code,
                    message: error.message,
                })
            }
            _ => Err(SmsError::Status(status)),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for SmsClient {
    async fn send(
        &self,
        channel: ChannelType,
        identifier: &str,
        message: &str,
    ) -> DeliveryOutcome {
        if !channel.is_phone_number() {
            return DeliveryOutcome::TransientFailure(format!(
                "{} is not a phone channel",
                channel.as_ref()
            ));
        }

        let recipient = match PhoneNumber::parse(identifier.to_string()) {
            Ok(recipient) => recipient,
            Err(err) => return DeliveryOutcome::TransientFailure(err),
        };

        match self.send_sms(&recipient, message).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(SmsError::Rejected { code, message }) => {
                tracing::warn!(code, "Recipient rejected the sender: {}", message);
                DeliveryOutcome::PermanentlyRejected
            }
            Err(err) => DeliveryOutcome::TransientFailure(format!("{:?}", err)),
        }
    }
}
