//! AWS Signature Version 4 signing for admin API requests.

use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    PayloadChecksumKind, SignableBody, SignableRequest, SigningSettings, sign,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;

use super::RadosGatewayError;

const SIGNING_SERVICE: &str = "s3";

/// Signs admin requests with the broker's admin key pair.
#[derive(Clone, Debug)]
pub(crate) struct RequestSigner {
    identity: Identity,
    region: String,
}

impl RequestSigner {
    pub(crate) fn new(access_key: &str, secret_key: &str, region: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "cosb");
        Self {
            identity: credentials.into(),
            region: region.to_owned(),
        }
    }

    /// Returns the headers to attach to the request.
    pub(crate) fn sign(
        &self,
        method: &str,
        url: &str,
        body: &[u8],
        at: SystemTime,
    ) -> Result<Vec<(String, String)>, RadosGatewayError> {
        let mut settings = SigningSettings::default();
        settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
        let params = v4::SigningParams::builder()
            .identity(&self.identity)
            .region(&self.region)
            .name(SIGNING_SERVICE)
            .time(at)
            .settings(settings)
            .build()
            .map_err(|err| RadosGatewayError::Signing(err.to_string()))?
            .into();
        let request = SignableRequest::new(
            method,
            url,
            std::iter::empty(),
            SignableBody::Bytes(body),
        )
        .map_err(|err| RadosGatewayError::Signing(err.to_string()))?;
        let (instructions, _signature) = sign(request, &params)
            .map_err(|err| RadosGatewayError::Signing(err.to_string()))?
            .into_parts();
        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect())
    }
}
