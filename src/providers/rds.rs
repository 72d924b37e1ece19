use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One RDS database instance as returned by `DescribeDBInstances`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbInstance {
    pub identifier: String,
    pub arn: String,
    pub engine: String,
    pub storage_encrypted: bool,
    pub auto_minor_version_upgrade: bool,
    pub publicly_accessible: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Region-scoped RDS API.
///
/// One instance is bound to exactly one region; pagination, credentials
/// and retries are the implementation's concern.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RdsProvider: Send + Sync {
    async fn describe_db_instances(&self) -> anyhow::Result<Vec<DbInstance>>;
}
