//! Wire types of the RADOS Gateway admin API.

use serde::{Deserialize, Serialize};

use crate::gateway::{S3Key, Subuser, SwiftKey, UserInfo};

/// `GET /{admin}/user` response.
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct UserInfoResponse {
    #[serde(default)]
    pub(crate) user_id: String,
    #[serde(default)]
    pub(crate) tenant: String,
    #[serde(default)]
    pub(crate) subusers: Vec<Subuser>,
    #[serde(default)]
    pub(crate) keys: Vec<S3Key>,
    #[serde(default)]
    pub(crate) swift_keys: Vec<SwiftKey>,
    #[serde(default)]
    pub(crate) stats: Option<UserStats>,
}

/// Usage block returned when `stats=true` is requested.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub(crate) struct UserStats {
    #[serde(default)]
    pub(crate) size_kb: u64,
}

impl UserInfoResponse {
    pub(crate) fn usage_mb(&self) -> u64 {
        self.stats.map_or(0, |stats| kb_to_mb(stats.size_kb))
    }
}

impl From<UserInfoResponse> for UserInfo {
    fn from(value: UserInfoResponse) -> Self {
        let user_id = value
            .user_id
            .rsplit_once('$')
            .map_or_else(|| value.user_id.clone(), |(_, user)| user.to_owned());
        Self {
            user_id,
            tenant: value.tenant,
            subusers: value.subusers,
            keys: value.keys,
            swift_keys: value.swift_keys,
        }
    }
}

/// `GET /{admin}/user?quota` response.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub(crate) struct QuotaResponse {
    #[serde(default)]
    pub(crate) max_size_kb: i64,
}

impl QuotaResponse {
    /// Configured quota in megabytes; unlimited quotas (`-1`) report zero.
    pub(crate) fn max_size_mb(self) -> u64 {
        u64::try_from(self.max_size_kb).map_or(0, kb_to_mb)
    }
}

/// `PUT /{admin}/user?quota` body.
#[derive(Clone, Copy, Debug, Serialize)]
pub(crate) struct QuotaRequest {
    pub(crate) enabled: bool,
    pub(crate) max_size_kb: u64,
    pub(crate) max_objects: i64,
}

impl QuotaRequest {
    pub(crate) const fn megabytes(quota_mb: u64) -> Self {
        Self {
            enabled: true,
            max_size_kb: quota_mb.saturating_mul(1024),
            max_objects: -1,
        }
    }
}

/// Error body of a rejected admin call.
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(rename = "Code", default)]
    pub(crate) code: String,
}

pub(crate) const fn kb_to_mb(kilobytes: u64) -> u64 {
    kilobytes >> 10
}
