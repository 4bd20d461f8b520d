// ============================================
// Backend Data Service
// ============================================
//
// The managed backend owns rows and object storage. The personalization core
// only appends behavior rows and uploads the trained model artifact; every
// call is best-effort and the local store stays authoritative.

pub mod rest;

pub use rest::RestBackend;

use crate::error::Result;
use crate::models::BehaviorRow;
use async_trait::async_trait;

#[async_trait]
pub trait BackendDataService: Send + Sync {
    /// Append rows to the behavior table
    async fn append_behavior_rows(&self, rows: &[BehaviorRow]) -> Result<()>;

    /// Upload a named artifact to `folder/file_name`, overwriting any existing object
    async fn upload_artifact(&self, folder: &str, file_name: &str, bytes: Vec<u8>) -> Result<()>;
}

/// Backend used when no remote service is configured
pub struct NoopBackend;

#[async_trait]
impl BackendDataService for NoopBackend {
    async fn append_behavior_rows(&self, _rows: &[BehaviorRow]) -> Result<()> {
        Ok(())
    }

    async fn upload_artifact(&self, _folder: &str, _file_name: &str, _bytes: Vec<u8>) -> Result<()> {
        Ok(())
    }
}
