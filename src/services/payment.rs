//! Client for the bank transfer API used to settle participation fees.

use std::{env, sync::Arc};

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PaymentSettings;

/// Failures reported by the payment collaborator.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Bank credentials were not provided through the environment.
    #[error("payment credentials are not configured")]
    MissingCredentials,
    /// Building the HTTP client failed.
    #[error("failed to build payment client")]
    ClientBuilder {
        /// HTTP client error.
        #[source]
        source: reqwest::Error,
    },
    /// The request never produced a response.
    #[error("payment request `{step}` failed")]
    Request {
        /// `sign-in` or `transfer`.
        step: &'static str,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The bank answered with a non-success status.
    #[error("payment step `{step}` was rejected with status {status}")]
    Rejected {
        /// `sign-in` or `transfer`.
        step: &'static str,
        /// Status the bank answered with.
        status: StatusCode,
    },
    /// Sign-in succeeded but no session ticket came back.
    #[error("payment sign-in returned no ticket")]
    MissingTicket,
}

/// Transfers `amount` to the account registered for `phone`.
pub trait PaymentGateway: Send + Sync {
    /// Charge `amount` for `phone`; the future resolves once the bank accepted the transfer.
    fn make_payment(&self, phone: String, amount: u64)
    -> BoxFuture<'static, Result<(), PaymentError>>;
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    login: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct SignInResponse {
    data: Option<SignInData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInData {
    sso_ticket: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest<'a> {
    ticket: &'a str,
    receiver_phone: &'a str,
    amount: u64,
    fee_amount: u64,
}

/// HTTP implementation: sign in, then submit one transfer with the returned ticket.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: Arc<str>,
    credentials: Option<(Arc<str>, Arc<str>)>,
}

impl HttpPaymentGateway {
    /// Gateway for `settings`; without `credentials` every payment is refused.
    pub fn new(
        settings: &PaymentSettings,
        credentials: Option<(String, String)>,
    ) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|source| PaymentError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(settings.base_url.trim_end_matches('/')),
            credentials: credentials.map(|(user, pass)| (Arc::from(user), Arc::from(pass))),
        })
    }

    /// Read `PAYMENT_USERNAME` / `PAYMENT_PASSWORD`; the gateway refuses payments without them.
    pub fn from_env(settings: &PaymentSettings) -> Result<Self, PaymentError> {
        let credentials = env::var("PAYMENT_USERNAME")
            .ok()
            .zip(env::var("PAYMENT_PASSWORD").ok());
        if credentials.is_none() {
            info!("payment credentials not set; fee payments will be refused");
        }
        Self::new(settings, credentials)
    }

    async fn sign_in(&self) -> Result<String, PaymentError> {
        let (login, password) = self
            .credentials
            .as_ref()
            .ok_or(PaymentError::MissingCredentials)?;

        let response = self
            .client
            .post(format!("{}/sessions/signin", self.base_url))
            .json(&SignInRequest {
                login: login.as_ref(),
                password: password.as_ref(),
            })
            .send()
            .await
            .map_err(|source| PaymentError::Request {
                step: "signin",
                source,
            })?;

        if !response.status().is_success() {
            return Err(PaymentError::Rejected {
                step: "signin",
                status: response.status(),
            });
        }

        let body: SignInResponse =
            response
                .json()
                .await
                .map_err(|source| PaymentError::Request {
                    step: "signin",
                    source,
                })?;

        body.data
            .and_then(|data| data.sso_ticket)
            .ok_or(PaymentError::MissingTicket)
    }

    async fn transfer(&self, phone: String, amount: u64) -> Result<(), PaymentError> {
        let ticket = self.sign_in().await?;
        debug!(amount, "submitting transfer");

        let response = self
            .client
            .post(format!("{}/transfers/process", self.base_url))
            .json(&TransferRequest {
                ticket: &ticket,
                receiver_phone: &phone,
                amount,
                fee_amount: 0,
            })
            .send()
            .await
            .map_err(|source| PaymentError::Request {
                step: "transfer",
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PaymentError::Rejected {
                step: "transfer",
                status: response.status(),
            })
        }
    }
}

impl PaymentGateway for HttpPaymentGateway {
    fn make_payment(
        &self,
        phone: String,
        amount: u64,
    ) -> BoxFuture<'static, Result<(), PaymentError>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.transfer(phone, amount).await })
    }
}
