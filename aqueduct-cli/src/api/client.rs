//! REST implementation of `Instance`
//!
//! A thin client over the platform's JSON endpoints. It only knows paths and
//! envelopes; every decision about what to send lives in the sync engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};

use super::error::{ApiError, ApiResult};
use super::instance::Instance;
use super::models::{Entity, Kind, PackageInstall, SessionIdentity};

/// Python version buckets the platform keeps packages in
const PYTHON_VERSIONS: [&str; 3] = ["Python2_7", "Python3_6", "Python3"];

/// Plugin uploads must carry this extension
const PLUGIN_EXTENSION: &str = ".swimbundle";

/// How to authenticate against an instance
#[derive(Debug, Clone)]
pub enum Credentials {
    Password { username: String, password: String },
    AccessToken(String),
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub credentials: Credentials,
    pub verify_ssl: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
enum Auth {
    Bearer(String),
    PrivateToken(String),
}

impl Auth {
    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::PrivateToken(token) => builder.header("Private-Token", token),
        }
    }
}

pub struct HttpInstance {
    http: Client,
    host: String,
    api_base: String,
    auth: Auth,
    session: SessionIdentity,
}

impl HttpInstance {
    /// Build the HTTP client and authenticate, capturing the session identity
    pub async fn connect(options: ConnectOptions) -> ApiResult<Self> {
        let host = options.host.trim_end_matches('/').to_string();
        let http = Client::builder()
            .danger_accept_invalid_certs(!options.verify_ssl)
            .timeout(options.timeout)
            .build()
            .map_err(|source| ApiError::Http {
                endpoint: host.clone(),
                source,
            })?;
        let api_base = format!("{}/api", host);

        let (auth, session) = match options.credentials {
            Credentials::Password { username, password } => {
                let endpoint = format!("{}/user/login", api_base);
                let response = http
                    .post(&endpoint)
                    .json(&json!({ "userName": username, "password": password }))
                    .send()
                    .await
                    .map_err(|source| ApiError::Http {
                        endpoint: endpoint.clone(),
                        source,
                    })?;
                if !response.status().is_success() {
                    return Err(ApiError::Auth(format!(
                        "login as '{}' on '{}' was rejected with HTTP {}",
                        username,
                        host,
                        response.status().as_u16()
                    )));
                }
                let body = read_json(Method::POST, endpoint.clone(), response)
                    .await?
                    .unwrap_or(Value::Null);
                let token = body
                    .get("token")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ApiError::Auth("login response carried no token".into()))?
                    .to_string();
                let session = match body.get("user").cloned() {
                    Some(user) => serde_json::from_value(user)
                        .map_err(|source| ApiError::Decode { endpoint, source })?,
                    None => SessionIdentity {
                        user_name: username,
                        display_name: None,
                    },
                };
                (Auth::Bearer(token), session)
            }
            Credentials::AccessToken(token) => {
                let auth = Auth::PrivateToken(token);
                let endpoint = format!("{}/user/authorize", api_base);
                let response = auth
                    .apply(http.get(&endpoint))
                    .send()
                    .await
                    .map_err(|source| ApiError::Http {
                        endpoint: endpoint.clone(),
                        source,
                    })?;
                if !response.status().is_success() {
                    return Err(ApiError::Auth(format!(
                        "access token for '{}' was rejected with HTTP {}",
                        host,
                        response.status().as_u16()
                    )));
                }
                let body = read_json(Method::GET, endpoint.clone(), response)
                    .await?
                    .unwrap_or(Value::Null);
                let session = serde_json::from_value(body)
                    .map_err(|source| ApiError::Decode { endpoint, source })?;
                (auth, session)
            }
        };

        log::info!("Connected to '{}' as '{}'", host, session.user_name);
        Ok(Self {
            http,
            host,
            api_base,
            auth,
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> ApiResult<Option<Value>> {
        let endpoint = self.url(path);
        log::debug!("{} {}", method, endpoint);
        let mut builder = self.auth.apply(self.http.request(method.clone(), &endpoint));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(|source| ApiError::Http {
            endpoint: endpoint.clone(),
            source,
        })?;
        read_json(method, endpoint, response).await
    }

    /// GET that maps a 404 to `None`
    async fn get_optional(&self, path: &str) -> ApiResult<Option<Value>> {
        match self.request(Method::GET, path, None).await {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        }
    }

    async fn send_form(&self, path: &str, form: Form, timeout: Option<Duration>) -> ApiResult<Option<Value>> {
        let endpoint = self.url(path);
        log::debug!("POST {} (multipart)", endpoint);
        let mut builder = self.auth.apply(self.http.post(&endpoint)).multipart(form);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await.map_err(|source| ApiError::Http {
            endpoint: endpoint.clone(),
            source,
        })?;
        read_json(Method::POST, endpoint, response).await
    }

    async fn list_packages(&self) -> ApiResult<Vec<Entity>> {
        let mut packages = Vec::new();
        for version in PYTHON_VERSIONS {
            let listed = self
                .request(Method::GET, &format!("pip/packages/{}", version), None)
                .await;
            if matches!(&listed, Err(e) if e.is_not_found()) {
                log::debug!("'{}' has no {} package runtime", self.host, version);
            }
            packages.extend(package_bucket(version, listed)?);
        }
        Ok(packages)
    }

    async fn list_credentials(&self) -> ApiResult<Vec<Entity>> {
        match self.request(Method::GET, list_path(Kind::KeyStore), None).await? {
            // The keystore answers with a map of key name to encrypted value
            Some(Value::Object(map)) => Ok(map
                .keys()
                .map(|key| {
                    let mut entity = Entity::new();
                    entity.insert("name", key.clone());
                    entity
                })
                .collect()),
            other => Ok(unwrap_list(other.unwrap_or(Value::Null))),
        }
    }
}

#[async_trait]
impl Instance for HttpInstance {
    fn host(&self) -> &str {
        &self.host
    }

    async fn product_version(&self) -> ApiResult<String> {
        let settings = self.request(Method::GET, "settings", None).await?;
        settings
            .as_ref()
            .and_then(|s| s.get("apiVersion").or_else(|| s.get("productVersion")))
            .and_then(Value::as_str)
            .map(|v| v.split('+').next().unwrap_or(v).to_string())
            .ok_or_else(|| ApiError::rejected(format!("'{}' did not report a product version", self.host)))
    }

    async fn session_user(&self) -> ApiResult<SessionIdentity> {
        Ok(self.session.clone())
    }

    async fn list(&self, kind: Kind) -> ApiResult<Vec<Entity>> {
        match kind {
            Kind::Package => self.list_packages().await,
            Kind::KeyStore => self.list_credentials().await,
            _ => {
                let value = self.request(Method::GET, list_path(kind), None).await?;
                Ok(unwrap_list(value.unwrap_or(Value::Null)))
            }
        }
    }

    async fn get(&self, kind: Kind, id: &str) -> ApiResult<Option<Entity>> {
        let value = self.get_optional(&item_path(kind, id)).await?;
        Ok(value.and_then(Entity::from_value))
    }

    async fn add(&self, kind: Kind, entity: &Entity) -> ApiResult<Entity> {
        match kind {
            Kind::Plugin => Err(ApiError::rejected("plugins are installed with upload_plugin")),
            Kind::Package => Err(ApiError::rejected("packages are installed with install_package")),
            _ => {
                let body = entity.to_value();
                let value = self.request(Method::POST, resource(kind), Some(&body)).await?;
                value
                    .and_then(Entity::from_value)
                    .ok_or_else(|| ApiError::rejected(format!("adding {} returned no record", kind)))
            }
        }
    }

    async fn update(&self, kind: Kind, id: &str, entity: &Entity) -> ApiResult<Entity> {
        let body = entity.to_value();
        let value = self.request(Method::PUT, &update_path(kind, id), Some(&body)).await?;
        match value {
            Some(Value::Object(map)) => Ok(Entity::from(map)),
            // Some endpoints acknowledge an update with a bare `true`
            Some(Value::Bool(true)) => Ok(entity.clone()),
            _ => Err(ApiError::rejected(format!("updating {} '{}' returned nothing", kind, id))),
        }
    }

    async fn get_workflow(&self, application_id: &str) -> ApiResult<Option<Entity>> {
        self.get(Kind::Workflow, application_id).await
    }

    async fn get_default_report_by_application_id(&self, application_id: &str) -> ApiResult<Option<Entity>> {
        let path = format!("reports/app/{}/default", urlencoding::encode(application_id));
        Ok(self.get_optional(&path).await?.and_then(Entity::from_value))
    }

    async fn search_user(&self, login_name: &str) -> ApiResult<Option<Entity>> {
        let path = format!("user/lookup?name={}", urlencoding::encode(login_name));
        let value = self.get_optional(&path).await?;
        Ok(unwrap_list(value.unwrap_or(Value::Null))
            .into_iter()
            .find(|u| u.str("userName").is_none_or(|u| u.eq_ignore_ascii_case(login_name))))
    }

    async fn download_plugin(&self, file_id: &str) -> ApiResult<Vec<u8>> {
        let endpoint = self.url(&format!("attachment/download/{}", urlencoding::encode(file_id)));
        let response = self
            .auth
            .apply(self.http.get(&endpoint))
            .send()
            .await
            .map_err(|source| ApiError::Http {
                endpoint: endpoint.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                method: "GET".into(),
                endpoint,
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        let bytes = response.bytes().await.map_err(|source| ApiError::Http { endpoint, source })?;
        Ok(bytes.to_vec())
    }

    async fn upload_plugin(&self, filename: &str, bundle: Vec<u8>) -> ApiResult<Entity> {
        let form = Form::new().part("file", Part::bytes(bundle).file_name(bundle_filename(filename)));
        let value = self.send_form("task/packages", form, None).await?;
        value
            .and_then(Entity::from_value)
            .ok_or_else(|| ApiError::rejected(format!("uploading plugin '{}' returned nothing", filename)))
    }

    async fn upgrade_plugin(&self, filename: &str, bundle: Vec<u8>) -> ApiResult<Entity> {
        let form = Form::new().part("file", Part::bytes(bundle).file_name(bundle_filename(filename)));
        let value = self.send_form("task/packages/upgrade", form, None).await?;
        value
            .and_then(Entity::from_value)
            .ok_or_else(|| ApiError::rejected(format!("upgrading plugin '{}' returned nothing", filename)))
    }

    async fn install_package(&self, package: &PackageInstall) -> ApiResult<Entity> {
        let body = serde_json::to_value(package).map_err(|source| ApiError::Decode {
            endpoint: self.url("pip/packages"),
            source,
        })?;
        let value = self.request(Method::POST, "pip/packages", Some(&body)).await?;
        Ok(value
            .and_then(Entity::from_value)
            .unwrap_or_else(|| Entity::from_value(body).unwrap_or_default()))
    }

    async fn install_package_offline(
        &self,
        filename: &str,
        wheel: Vec<u8>,
        package: &PackageInstall,
    ) -> ApiResult<Entity> {
        let form = Form::new()
            .text("name", package.name.clone())
            .text("version", package.version.clone())
            .text("pythonVersion", package.python_version.clone())
            .part("wheel", Part::bytes(wheel).file_name(filename.to_string()));
        let value = self
            .send_form("pip/packages/offline", form, Some(Duration::from_secs(120)))
            .await?;
        Ok(value.and_then(Entity::from_value).unwrap_or_else(|| {
            let mut entity = Entity::new();
            entity.insert("name", package.name.clone());
            entity.insert("version", package.version.clone());
            entity.insert("pythonVersion", package.python_version.clone());
            entity
        }))
    }
}

async fn read_json(method: Method, endpoint: String, response: Response) -> ApiResult<Option<Value>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            method: method.to_string(),
            endpoint,
            status: status.as_u16(),
            body,
        });
    }
    if status == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    let bytes = response.bytes().await.map_err(|source| ApiError::Http {
        endpoint: endpoint.clone(),
        source,
    })?;
    if bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| ApiError::Decode { endpoint, source })
}

/// Flatten the list envelopes different endpoints use (`[...]`, `{tasks: [...]}`, `{items: [...]}`, `{groups: [...]}`)
fn unwrap_list(value: Value) -> Vec<Entity> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => ["items", "tasks", "groups"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    items.into_iter().filter_map(Entity::from_value).collect()
}

fn resource(kind: Kind) -> &'static str {
    match kind {
        Kind::KeyStore => "credentials",
        Kind::Package => "pip/packages",
        Kind::Plugin => "task/packages",
        Kind::Asset => "asset",
        Kind::Workspace => "workspaces",
        Kind::Applet => "applet",
        Kind::Application => "app",
        Kind::Workflow => "workflow/",
        Kind::Task => "task",
        Kind::Report => "reports",
        Kind::Dashboard => "dashboard",
        Kind::User => "user",
        Kind::Group => "groups",
        Kind::Role => "roles",
    }
}

fn list_path(kind: Kind) -> &'static str {
    match kind {
        Kind::Task => "task/list",
        Kind::User => "user/light",
        other => resource(other),
    }
}

fn item_path(kind: Kind, id: &str) -> String {
    format!(
        "{}/{}",
        resource(kind).trim_end_matches('/'),
        urlencoding::encode(id)
    )
}

fn update_path(kind: Kind, id: &str) -> String {
    match kind {
        // Applications are updated against the collection; the id travels in the body
        Kind::Application => resource(kind).to_string(),
        other => item_path(other, id),
    }
}

fn bundle_filename(filename: &str) -> String {
    if filename.ends_with(PLUGIN_EXTENSION) {
        filename.to_string()
    } else {
        let stem = filename.split('.').next().unwrap_or(filename);
        format!("{}{}", stem, PLUGIN_EXTENSION)
    }
}

/// Packages of one runtime bucket, tagged with the runtime.
///
/// A runtime the instance does not have (404) is empty; any other failure is returned.
fn package_bucket(version: &str, listed: ApiResult<Option<Value>>) -> ApiResult<Vec<Entity>> {
    let value = match listed {
        Ok(value) => value.unwrap_or(Value::Null),
        Err(e) if e.is_not_found() => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    Ok(unwrap_list(value)
        .into_iter()
        .map(|mut package| {
            if package.str("pythonVersion").is_none() {
                package.insert("pythonVersion", version);
            }
            package
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_list_handles_envelopes() {
        assert_eq!(unwrap_list(json!([{"id": "a"}])).len(), 1);
        assert_eq!(unwrap_list(json!({"tasks": [{"id": "a"}, {"id": "b"}]})).len(), 2);
        assert_eq!(unwrap_list(json!({"items": [{"id": "a"}]})).len(), 1);
        assert_eq!(unwrap_list(json!({"groups": [{"id": "a"}]})).len(), 1);
        assert!(unwrap_list(json!({"unexpected": true})).is_empty());
        assert!(unwrap_list(Value::Null).is_empty());
    }

    #[test]
    fn test_paths_per_kind() {
        assert_eq!(list_path(Kind::Task), "task/list");
        assert_eq!(item_path(Kind::Task, "t1"), "task/t1");
        assert_eq!(item_path(Kind::Workflow, "app-1"), "workflow/app-1");
        assert_eq!(list_path(Kind::Workspace), "workspaces");
        assert_eq!(update_path(Kind::Workspace, "w1"), "workspaces/w1");
        assert_eq!(update_path(Kind::Applet, "ap1"), "applet/ap1");
        assert_eq!(update_path(Kind::Application, "a1"), "app");
        assert_eq!(update_path(Kind::Report, "r 1"), "reports/r%201");
    }

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            method: "GET".into(),
            endpoint: "https://a/api/pip/packages/Python3".into(),
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_package_bucket_tags_runtime() {
        let listed = Ok(Some(json!([
            {"name": "requests", "version": "2.31.0"},
            {"name": "six", "version": "1.16.0", "pythonVersion": "Python3_6"}
        ])));
        let packages = package_bucket("Python3", listed).unwrap();
        assert_eq!(packages[0].str("pythonVersion"), Some("Python3"));
        assert_eq!(packages[1].str("pythonVersion"), Some("Python3_6"));
    }

    #[test]
    fn test_package_bucket_only_tolerates_missing_runtime() {
        assert!(package_bucket("Python2_7", Err(status(404))).unwrap().is_empty());

        let err = package_bucket("Python3", Err(status(401))).unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 401, .. }));
        assert!(package_bucket("Python3", Err(ApiError::rejected("down"))).is_err());
    }

    #[test]
    fn test_bundle_filename_forces_extension() {
        assert_eq!(bundle_filename("sw_virus_total.swimbundle"), "sw_virus_total.swimbundle");
        assert_eq!(bundle_filename("sw_virus_total.zip"), "sw_virus_total.swimbundle");
        assert_eq!(bundle_filename("sw_virus_total"), "sw_virus_total.swimbundle");
    }
}
