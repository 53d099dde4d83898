//! The system-access seam consumed by the migration engine
//!
//! Source and destination are two values of the same trait. The engine never
//! talks HTTP itself; it only sees generic records per component kind plus the
//! handful of kind-specific lookups below.

use async_trait::async_trait;

use super::error::ApiResult;
use super::models::{Entity, Kind, PackageInstall, SessionIdentity};

#[async_trait]
pub trait Instance: Send + Sync {
    /// Base host this instance talks to, for log lines
    fn host(&self) -> &str;

    /// Product version reported by the platform (e.g. `10.5.2`)
    async fn product_version(&self) -> ApiResult<String>;

    /// The account this client is authenticated as
    async fn session_user(&self) -> ApiResult<SessionIdentity>;

    /// List every record of a kind. List endpoints may return light records.
    async fn list(&self, kind: Kind) -> ApiResult<Vec<Entity>>;

    /// Fetch the full record by its instance-local id
    async fn get(&self, kind: Kind, id: &str) -> ApiResult<Option<Entity>>;

    async fn add(&self, kind: Kind, entity: &Entity) -> ApiResult<Entity>;

    async fn update(&self, kind: Kind, id: &str, entity: &Entity) -> ApiResult<Entity>;

    /// The workflow belonging to an application
    async fn get_workflow(&self, application_id: &str) -> ApiResult<Option<Entity>>;

    /// The report named "Default" that every application owns
    async fn get_default_report_by_application_id(
        &self,
        application_id: &str,
    ) -> ApiResult<Option<Entity>>;

    /// Look a user up by login name
    async fn search_user(&self, login_name: &str) -> ApiResult<Option<Entity>>;

    /// Download a stored plugin bundle or package wheel by file id
    async fn download_plugin(&self, file_id: &str) -> ApiResult<Vec<u8>>;

    async fn upload_plugin(&self, filename: &str, bundle: Vec<u8>) -> ApiResult<Entity>;

    async fn upgrade_plugin(&self, filename: &str, bundle: Vec<u8>) -> ApiResult<Entity>;

    /// Install a Python package from the platform's package index
    async fn install_package(&self, package: &PackageInstall) -> ApiResult<Entity>;

    /// Install a Python package from a wheel transferred by the caller
    async fn install_package_offline(
        &self,
        filename: &str,
        wheel: Vec<u8>,
        package: &PackageInstall,
    ) -> ApiResult<Entity>;
}
