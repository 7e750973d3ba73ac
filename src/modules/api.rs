//! HTTP client for the back-office REST API.

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::modules::locale::Locale;
use crate::modules::models::{
    DashboardStats, Envelope, ListQuery, LoginResponse, Paginated, PdfStatus, ProjectImage,
    QuoteStatus, User,
};

/// Admin resources exposed under `/admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Categories,
    Projects,
    Users,
    Quotes,
    Reviews,
    ContactMessages,
}

impl Resource {
    pub fn path(self) -> &'static str {
        match self {
            Resource::Categories => "admin/categories",
            Resource::Projects => "admin/projects",
            Resource::Users => "admin/users",
            Resource::Quotes => "admin/quotes",
            Resource::Reviews => "admin/reviews",
            Resource::ContactMessages => "admin/contact-messages",
        }
    }

    fn item_path(self, id: u64) -> String {
        format!("{}/{id}", self.path())
    }
}

/// API client. Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    locale: Locale,
    token: Option<String>,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig, token: Option<&str>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            locale: config.locale,
            token: token.map(str::to_string),
        })
    }

    pub fn set_token(&mut self, token: Option<&str>) {
        self.token = token.map(str::to_string);
    }

    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    /// The underlying pooled client, shared with the broadcast channel authorizer.
    pub fn http(&self) -> &Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, self.url(path))
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, self.locale.code());
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let response = checked(req.send().await?).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_unit(&self, req: RequestBuilder) -> Result<(), ApiError> {
        checked(req.send().await?).await?;
        Ok(())
    }

    async fn send_one<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        self.send::<Envelope<T>>(req).await.map(Envelope::into_inner)
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let req = self
            .request(Method::POST, "login")
            .json(&json!({ "email": email, "password": password }));
        self.send(req).await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::POST, "logout")).await
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        self.send_one(self.request(Method::GET, "user")).await
    }

    // ------------------------------------------------------------------
    // Generic resource access
    // ------------------------------------------------------------------

    pub async fn list<T: DeserializeOwned>(
        &self,
        resource: Resource,
        query: &ListQuery,
    ) -> Result<Paginated<T>, ApiError> {
        debug!(resource = resource.path(), page = query.page, search = ?query.search, "listing");
        self.send(self.request(Method::GET, resource.path()).query(query)).await
    }

    pub async fn get<T: DeserializeOwned>(&self, resource: Resource, id: u64) -> Result<T, ApiError> {
        self.send_one(self.request(Method::GET, &resource.item_path(id))).await
    }

    pub async fn create<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        resource: Resource,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_one(self.request(Method::POST, resource.path()).json(body)).await
    }

    pub async fn update<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        resource: Resource,
        id: u64,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_one(self.request(Method::PUT, &resource.item_path(id)).json(body)).await
    }

    pub async fn delete(&self, resource: Resource, id: u64) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::DELETE, &resource.item_path(id))).await
    }

    // ------------------------------------------------------------------
    // Resource-specific endpoints
    // ------------------------------------------------------------------

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.send_one(self.request(Method::GET, "admin/dashboard")).await
    }

    pub async fn upload_project_image(
        &self,
        project_id: u64,
        file: &Path,
    ) -> Result<ProjectImage, ApiError> {
        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let form = Form::new().part("image", Part::bytes(bytes).file_name(file_name));
        let path = format!("{}/images", Resource::Projects.item_path(project_id));
        self.send_one(self.request(Method::POST, &path).multipart(form)).await
    }

    pub async fn update_quote_status(&self, quote_id: u64, status: QuoteStatus) -> Result<(), ApiError> {
        let path = format!("{}/status", Resource::Quotes.item_path(quote_id));
        self.send_unit(self.request(Method::PATCH, &path).json(&json!({ "status": status }))).await
    }

    pub async fn generate_quote_pdf(&self, quote_id: u64) -> Result<(), ApiError> {
        let path = format!("{}/pdf", Resource::Quotes.item_path(quote_id));
        self.send_unit(self.request(Method::POST, &path)).await
    }

    pub async fn quote_pdf_status(&self, quote_id: u64) -> Result<PdfStatus, ApiError> {
        let path = format!("{}/pdf-status", Resource::Quotes.item_path(quote_id));
        self.send_one(self.request(Method::GET, &path)).await
    }

    pub async fn set_review_approval(&self, review_id: u64, approved: bool) -> Result<(), ApiError> {
        let path = format!("{}/approval", Resource::Reviews.item_path(review_id));
        self.send_unit(self.request(Method::PATCH, &path).json(&json!({ "is_approved": approved }))).await
    }

    pub async fn mark_message_read(&self, message_id: u64) -> Result<(), ApiError> {
        let path = format!("{}/read", Resource::ContactMessages.item_path(message_id));
        self.send_unit(self.request(Method::PATCH, &path)).await
    }
}

async fn checked(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_status(status.as_u16(), &body))
}
