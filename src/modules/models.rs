use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub projects_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectImage {
    pub id: u64,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<u64>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub images: Vec<ProjectImage>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    #[default]
    Pending,
    InProgress,
    Accepted,
    Rejected,
    Completed,
    #[serde(other)]
    Unknown,
}

impl QuoteStatus {
    /// Next status in the review workflow, used by the status toggle key.
    pub fn next(self) -> Self {
        match self {
            QuoteStatus::Pending => QuoteStatus::InProgress,
            QuoteStatus::InProgress => QuoteStatus::Accepted,
            QuoteStatus::Accepted => QuoteStatus::Completed,
            QuoteStatus::Completed => QuoteStatus::Rejected,
            QuoteStatus::Rejected | QuoteStatus::Unknown => QuoteStatus::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::InProgress => "in_progress",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Rejected => "rejected",
            QuoteStatus::Completed => "completed",
            QuoteStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quote {
    pub id: u64,
    #[serde(default)]
    pub reference: Option<String>,
    pub client_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: QuoteStatus,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub client_name: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: u64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default)]
    pub projects: u64,
    #[serde(default)]
    pub quotes: u64,
    #[serde(default)]
    pub pending_quotes: u64,
    #[serde(default)]
    pub unread_messages: u64,
    #[serde(default)]
    pub pending_reviews: u64,
    #[serde(default)]
    pub users: u64,
}

/// Readiness of an asynchronously generated document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PdfStatus {
    pub ready: bool,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(alias = "access_token")]
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageMeta {
    #[serde(default = "first_page")]
    pub current_page: u32,
    #[serde(default = "first_page")]
    pub last_page: u32,
    #[serde(default)]
    pub total: u64,
}

fn first_page() -> u32 {
    1
}

/// A Laravel paginator response. Plain `paginate()` puts the counters at the top level,
/// API resource collections nest them under `meta`.
#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[serde(default)]
    meta: Option<PageMeta>,
    #[serde(default)]
    current_page: Option<u32>,
    #[serde(default)]
    last_page: Option<u32>,
    #[serde(default)]
    total: Option<u64>,
}

impl<T> Paginated<T> {
    pub fn page_meta(&self) -> PageMeta {
        if let Some(meta) = self.meta {
            return meta;
        }
        PageMeta {
            current_page: self.current_page.unwrap_or(1),
            last_page: self.last_page.unwrap_or(1),
            total: self.total.unwrap_or(self.data.len() as u64),
        }
    }
}

/// Single resources come back either bare or wrapped in `{"data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

/// Query string for list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListQuery {
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl ListQuery {
    pub fn page(page: u32) -> Self {
        Self {
            page: page.max(1),
            search: None,
        }
    }

    pub fn with_search(mut self, search: Option<&str>) -> Self {
        self.search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewProject {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}
