use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::modules::api::{ApiClient, Resource};
use crate::modules::models::{
    Category, ContactMessage, ListQuery, Paginated, Project, Quote, Review, User,
};

/// How a record shows up in a list row and in the detail pane.
pub trait Listed {
    fn id(&self) -> u64;
    fn label(&self) -> String;
    fn detail(&self) -> Vec<String>;
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

impl Listed for Category {
    fn id(&self) -> u64 { self.id }

    fn label(&self) -> String {
        match self.projects_count {
            Some(n) => format!("{} ({} projects)", self.name, n),
            None => self.name.clone(),
        }
    }

    fn detail(&self) -> Vec<String> {
        vec![
            format!("Name: {}", self.name),
            format!("Slug: {}", opt(&self.slug)),
            format!("Description: {}", opt(&self.description)),
        ]
    }
}

impl Listed for Project {
    fn id(&self) -> u64 { self.id }

    fn label(&self) -> String {
        let star = if self.is_featured { "★ " } else { "" };
        let category = self.category.as_ref().map(|c| c.name.as_str()).unwrap_or("uncategorized");
        format!("{star}{} [{}] {} image(s)", self.title, category, self.images.len())
    }

    fn detail(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Title: {}", self.title),
            format!("Location: {}", opt(&self.location)),
            format!("Description: {}", opt(&self.description)),
            format!("Created: {}", opt(&self.created_at)),
        ];
        lines.extend(self.images.iter().map(|img| format!("Image #{}: {}", img.id, img.url)));
        lines
    }
}

impl Listed for User {
    fn id(&self) -> u64 { self.id }

    fn label(&self) -> String {
        format!("{} <{}> {}", self.name, self.email, self.role.as_deref().unwrap_or(""))
    }

    fn detail(&self) -> Vec<String> {
        vec![
            format!("Name: {}", self.name),
            format!("Email: {}", self.email),
            format!("Role: {}", opt(&self.role)),
            format!("Created: {}", opt(&self.created_at)),
        ]
    }
}

impl Listed for Quote {
    fn id(&self) -> u64 { self.id }

    fn label(&self) -> String {
        let pdf = if self.pdf_url.is_some() { " 📄" } else { "" };
        format!(
            "{} {} - {} [{}]{}",
            self.reference.as_deref().unwrap_or("#"),
            self.client_name,
            self.service_type.as_deref().unwrap_or("general"),
            self.status,
            pdf
        )
    }

    fn detail(&self) -> Vec<String> {
        vec![
            format!("Client: {} <{}>", self.client_name, self.email),
            format!("Phone: {}", opt(&self.phone)),
            format!("Service: {}", opt(&self.service_type)),
            format!("Status: {}", self.status),
            format!("PDF: {}", opt(&self.pdf_url)),
            format!("Message: {}", opt(&self.message)),
        ]
    }
}

impl Listed for Review {
    fn id(&self) -> u64 { self.id }

    fn label(&self) -> String {
        let stars = "★".repeat(usize::from(self.rating.min(5)));
        let state = if self.is_approved { "approved" } else { "pending" };
        format!("{stars:<5} {} ({state})", self.client_name)
    }

    fn detail(&self) -> Vec<String> {
        vec![
            format!("Client: {}", self.client_name),
            format!("Rating: {}/5", self.rating),
            format!("Approved: {}", self.is_approved),
            format!("Comment: {}", opt(&self.comment)),
        ]
    }
}

impl Listed for ContactMessage {
    fn id(&self) -> u64 { self.id }

    fn label(&self) -> String {
        let dot = if self.is_read { " " } else { "●" };
        format!("{dot} {} - {}", self.name, self.subject.as_deref().unwrap_or("(no subject)"))
    }

    fn detail(&self) -> Vec<String> {
        vec![
            format!("From: {} <{}>", self.name, self.email),
            format!("Subject: {}", opt(&self.subject)),
            format!("Received: {}", opt(&self.created_at)),
            String::new(),
            self.message.clone(),
        ]
    }
}

/// One page of an admin resource plus the paging/search state used to fetch it.
pub struct ResourceList<T> {
    pub resource: Resource,
    pub items: Vec<T>,
    pub page: u32,
    pub last_page: u32,
    pub total: u64,
    pub search: Option<String>,
    pub loaded: bool,
}

impl<T> ResourceList<T> {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            items: Vec::new(),
            page: 1,
            last_page: 1,
            total: 0,
            search: None,
            loaded: false,
        }
    }

    pub fn query(&self) -> ListQuery {
        ListQuery::page(self.page).with_search(self.search.as_deref())
    }

    /// Moves the cursor; the caller reloads. Returns false at the last page.
    pub fn next_page(&mut self) -> bool {
        if self.page < self.last_page {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page > 1 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    pub fn set_search(&mut self, query: &str) {
        let trimmed = query.trim();
        self.search = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self.page = 1;
    }

    pub fn reset(&mut self) {
        self.items.clear();
        self.page = 1;
        self.last_page = 1;
        self.total = 0;
        self.search = None;
        self.loaded = false;
    }

    pub fn page_label(&self) -> String {
        let mut label = format!("page {}/{} · {} total", self.page, self.last_page, self.total);
        if let Some(search) = &self.search {
            label.push_str(&format!(" · search \"{search}\""));
        }
        label
    }
}

impl<T: DeserializeOwned> ResourceList<T> {
    pub fn apply(&mut self, page: Paginated<T>) {
        let meta = page.page_meta();
        self.page = meta.current_page.max(1);
        self.last_page = meta.last_page.max(self.page);
        self.total = meta.total;
        self.items = page.data;
        self.loaded = true;
    }

    pub async fn reload(&mut self, api: &ApiClient) -> Result<(), ApiError> {
        let page = api.list(self.resource, &self.query()).await?;
        self.apply(page);
        Ok(())
    }
}
