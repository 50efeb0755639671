//! RADOS Gateway admin API implementation of the admin gateway.
//!
//! Requests go to `{endpoint}/{admin_path}/user` and are signed with
//! Signature Version 4 using the broker's admin key pair. Each call is one
//! round trip bounded by the configured timeout; nothing is retried.

mod error;
mod signing;
mod types;

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};

use reqwest::{Client, Method, Url};
use tracing::debug;

use crate::gateway::{
    AdminGateway, GatewayFuture, S3Key, Subuser, UserInfo, qualified_subuser, qualified_uid,
};
use signing::RequestSigner;
use types::{ErrorBody, QuotaRequest, QuotaResponse, UserInfoResponse};

pub use error::RadosGatewayError;

/// Default timeout for a single admin call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for [`RadosGateway`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GatewaySettings {
    /// Base URL of the gateway, without a trailing slash.
    pub endpoint: String,
    /// Resource path of the admin API, usually `admin`.
    pub admin_path: String,
    /// Admin access key.
    pub access_key: String,
    /// Admin secret key.
    pub secret_key: String,
    /// Signing region.
    pub region: String,
    /// Per-call timeout.
    pub timeout: Duration,
}

struct AdminCall<'a> {
    operation: &'static str,
    method: Method,
    params: Vec<(&'static str, &'a str)>,
    body: Vec<u8>,
}

impl<'a> AdminCall<'a> {
    fn new(operation: &'static str, method: Method, uid: &'a str) -> Self {
        Self {
            operation,
            method,
            params: vec![("uid", uid)],
            body: Vec::new(),
        }
    }

    fn param(mut self, name: &'static str, value: &'a str) -> Self {
        self.params.push((name, value));
        self
    }

    fn json_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

/// Admin gateway backed by the RADOS Gateway admin REST API.
#[derive(Clone, Debug)]
pub struct RadosGateway {
    client: Client,
    base: Url,
    signer: RequestSigner,
}

impl RadosGateway {
    /// Builds a client for the configured gateway.
    ///
    /// # Errors
    ///
    /// Returns [`RadosGatewayError::Endpoint`] when the endpoint and admin
    /// path do not form a URL and [`RadosGatewayError::Client`] when the HTTP
    /// client cannot be created.
    pub fn new(settings: &GatewaySettings) -> Result<Self, RadosGatewayError> {
        let admin_path = settings.admin_path.trim_matches('/');
        let base = Url::parse(&format!(
            "{}/{admin_path}/user",
            settings.endpoint.trim_end_matches('/')
        ))
        .map_err(|err| RadosGatewayError::Endpoint(err.to_string()))?;
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| RadosGatewayError::Client(err.to_string()))?;
        Ok(Self {
            client,
            base,
            signer: RequestSigner::new(&settings.access_key, &settings.secret_key, &settings.region),
        })
    }

    fn url_for(&self, params: &[(&'static str, &str)]) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().extend_pairs(params.iter().copied());
        url
    }

    async fn execute(&self, call: AdminCall<'_>) -> Result<Vec<u8>, RadosGatewayError> {
        let url = self.url_for(&call.params);
        let headers = self
            .signer
            .sign(call.method.as_str(), url.as_str(), &call.body, SystemTime::now())?;
        debug!(operation = call.operation, method = %call.method, path = url.path(), "admin call");

        let mut request = self.client.request(call.method, url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if !call.body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(call.body);
        }

        let transport = |err: reqwest::Error| RadosGatewayError::Transport {
            operation: call.operation,
            message: err.to_string(),
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;
        if status.is_success() {
            return Ok(body.to_vec());
        }
        let code = serde_json::from_slice::<ErrorBody>(&body)
            .map(|error| error.code)
            .unwrap_or_default();
        Err(RadosGatewayError::Api {
            operation: call.operation,
            status: status.as_u16(),
            code,
        })
    }

    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        call: AdminCall<'_>,
    ) -> Result<T, RadosGatewayError> {
        let operation = call.operation;
        let body = self.execute(call).await?;
        serde_json::from_slice(&body).map_err(|err| RadosGatewayError::Decode {
            operation,
            message: err.to_string(),
        })
    }

    /// Runs a delete, treating an already absent entity as deleted.
    async fn execute_delete(&self, call: AdminCall<'_>) -> Result<(), RadosGatewayError> {
        let operation = call.operation;
        match self.execute(call).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!(operation, "entity already absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn user_info(&self, uid: &str) -> Result<UserInfoResponse, RadosGatewayError> {
        self.execute_json(AdminCall::new("read user", Method::GET, uid).param("stats", "true"))
            .await
    }
}

impl AdminGateway for RadosGateway {
    type Error = RadosGatewayError;

    fn create_user<'a>(
        &'a self,
        user: &'a str,
        display_name: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let call = AdminCall::new("create user", Method::PUT, user)
                .param("display-name", display_name)
                .param("tenant", tenant);
            self.execute(call).await.map(drop)
        })
    }

    fn delete_user<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let uid = qualified_uid(user, tenant);
            let call =
                AdminCall::new("delete user", Method::DELETE, &uid).param("purge-data", "true");
            self.execute_delete(call).await
        })
    }

    fn get_user<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, UserInfo, Self::Error> {
        Box::pin(async move {
            let uid = qualified_uid(user, tenant);
            self.user_info(&uid).await.map(UserInfo::from)
        })
    }

    fn set_user_quota<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
        quota_mb: u64,
    ) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let uid = qualified_uid(user, tenant);
            let body = serde_json::to_vec(&QuotaRequest::megabytes(quota_mb)).map_err(|err| {
                RadosGatewayError::Decode {
                    operation: "set quota",
                    message: err.to_string(),
                }
            })?;
            let call = AdminCall::new("set quota", Method::PUT, &uid)
                .param("quota", "")
                .param("quota-type", "user")
                .json_body(body);
            self.execute(call).await.map(drop)
        })
    }

    fn get_user_quota_mb<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, u64, Self::Error> {
        Box::pin(async move {
            let uid = qualified_uid(user, tenant);
            let call = AdminCall::new("read quota", Method::GET, &uid)
                .param("quota", "")
                .param("quota-type", "user");
            self.execute_json::<QuotaResponse>(call)
                .await
                .map(QuotaResponse::max_size_mb)
        })
    }

    fn get_user_usage_mb<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, u64, Self::Error> {
        Box::pin(async move {
            let uid = qualified_uid(user, tenant);
            self.user_info(&uid).await.map(|info| info.usage_mb())
        })
    }

    fn create_subuser<'a>(
        &'a self,
        user: &'a str,
        subuser: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, Subuser, Self::Error> {
        Box::pin(async move {
            let uid = qualified_uid(user, tenant);
            let call = AdminCall::new("create subuser", Method::PUT, &uid)
                .param("subuser", subuser)
                .param("access", "readwrite")
                .param("key-type", "swift")
                .param("generate-secret", "true");
            let subusers: Vec<Subuser> = self.execute_json(call).await?;
            let id = qualified_subuser(user, subuser, tenant);
            subusers
                .into_iter()
                .find(|entry| entry.id == id)
                .ok_or(RadosGatewayError::MissingCredential {
                    operation: "create subuser",
                    missing: id,
                })
        })
    }

    fn delete_subuser<'a>(
        &'a self,
        user: &'a str,
        subuser: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let uid = qualified_uid(user, tenant);
            let call = AdminCall::new("delete subuser", Method::DELETE, &uid)
                .param("subuser", subuser)
                .param("purge-keys", "true");
            self.execute_delete(call).await
        })
    }

    fn create_s3_key<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
    ) -> GatewayFuture<'a, S3Key, Self::Error> {
        Box::pin(async move {
            let uid = qualified_uid(user, tenant);
            let before: BTreeSet<String> = self
                .user_info(&uid)
                .await?
                .keys
                .into_iter()
                .map(|key| key.access_key)
                .collect();
            let call = AdminCall::new("create s3 key", Method::PUT, &uid)
                .param("key", "")
                .param("key-type", "s3")
                .param("generate-key", "true");
            let keys: Vec<S3Key> = self.execute_json(call).await?;
            keys.into_iter()
                .find(|key| !before.contains(&key.access_key))
                .ok_or_else(|| RadosGatewayError::MissingCredential {
                    operation: "create s3 key",
                    missing: String::from("a new access key"),
                })
        })
    }

    fn delete_s3_key<'a>(
        &'a self,
        user: &'a str,
        tenant: &'a str,
        access_key: &'a str,
    ) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let uid = qualified_uid(user, tenant);
            let call = AdminCall::new("delete s3 key", Method::DELETE, &uid)
                .param("key", "")
                .param("access-key", access_key);
            self.execute_delete(call).await
        })
    }
}
