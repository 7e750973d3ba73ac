use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, Session};
use crate::error::ApiError;
use crate::modules::{
    api::{ApiClient, Resource},
    broadcast::{BroadcastEvent, BroadcastListener, ListenerHandle, ListenerSettings},
    models::{
        Category, ContactMessage, DashboardStats, NewCategory, NewProject, NewUser, Project, Quote,
        Review, User,
    },
    notifications::NotificationFeed,
    polling::{self, PollHandle, PollSettings, QuotePdfSource, Readiness},
    resources::{Listed, ResourceList},
};

const EVENT_BUFFER: usize = 256;
const STATS_REFRESH: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MenuSection {
    Dashboard,
    Notifications,
    Quotes,
    Projects,
    Categories,
    Users,
    Reviews,
    Messages,
}

impl MenuSection {
    pub const ALL: [MenuSection; 8] = [
        MenuSection::Dashboard,
        MenuSection::Notifications,
        MenuSection::Quotes,
        MenuSection::Projects,
        MenuSection::Categories,
        MenuSection::Users,
        MenuSection::Reviews,
        MenuSection::Messages,
    ];

    pub fn title(self) -> &'static str {
        match self {
            MenuSection::Dashboard => "Dashboard",
            MenuSection::Notifications => "Notifications",
            MenuSection::Quotes => "Quotes",
            MenuSection::Projects => "Projects",
            MenuSection::Categories => "Categories",
            MenuSection::Users => "Users",
            MenuSection::Reviews => "Reviews",
            MenuSection::Messages => "Messages",
        }
    }

    pub fn resource(self) -> Option<Resource> {
        match self {
            MenuSection::Quotes => Some(Resource::Quotes),
            MenuSection::Projects => Some(Resource::Projects),
            MenuSection::Categories => Some(Resource::Categories),
            MenuSection::Users => Some(Resource::Users),
            MenuSection::Reviews => Some(Resource::Reviews),
            MenuSection::Messages => Some(Resource::ContactMessages),
            MenuSection::Dashboard | MenuSection::Notifications => None,
        }
    }

    fn position(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppState {
    Normal,
    Input,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputPurpose {
    LoginEmail,
    LoginPassword,
    Search,
    NewItem,
    EditItem,
    UploadImage,
}

pub struct App {
    pub config: Config,
    session: Session,
    api: ApiClient,

    pub current_section: MenuSection,
    pub state: AppState,
    pub selected_index: usize,
    pub input_buffer: String,
    pub input_cursor: usize,
    pub input_prompt: String,
    pub input_purpose: InputPurpose,
    pub confirm_message: String,
    pub status_message: String,
    pub show_detail: bool,
    pub show_help: bool,
    pub last_refresh: Instant,

    pub user: Option<User>,
    pub stats: Option<DashboardStats>,
    pub notifications: NotificationFeed,
    pub quotes: ResourceList<Quote>,
    pub projects: ResourceList<Project>,
    pub categories: ResourceList<Category>,
    pub users: ResourceList<User>,
    pub reviews: ResourceList<Review>,
    pub messages: ResourceList<ContactMessage>,

    listener: Option<ListenerHandle>,
    events_tx: mpsc::Sender<BroadcastEvent>,
    events_rx: mpsc::Receiver<BroadcastEvent>,
    pdf_polls: HashMap<u64, PollHandle>,
    login_email: String,
    pending_initial_load: bool,
    needs_load: bool,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let session = Session::load(&config.directory())?;
        let api = ApiClient::new(&config.api, session.token()).context("Creating API client")?;
        Ok(Self::with_parts(config, session, api))
    }

    pub fn with_parts(config: Config, session: Session, api: ApiClient) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let notifications = NotificationFeed::new(config.notifications.max_items);
        let signed_in = session.is_authenticated();

        let mut app = Self {
            config,
            session,
            api,
            current_section: MenuSection::Dashboard,
            state: AppState::Normal,
            selected_index: 0,
            input_buffer: String::new(),
            input_cursor: 0,
            input_prompt: String::new(),
            input_purpose: InputPurpose::Search,
            confirm_message: String::new(),
            status_message: String::from("Welcome to atelier! Press '?' for help"),
            show_detail: false,
            show_help: false,
            last_refresh: Instant::now(),
            user: None,
            stats: None,
            notifications,
            quotes: ResourceList::new(Resource::Quotes),
            projects: ResourceList::new(Resource::Projects),
            categories: ResourceList::new(Resource::Categories),
            users: ResourceList::new(Resource::Users),
            reviews: ResourceList::new(Resource::Reviews),
            messages: ResourceList::new(Resource::ContactMessages),
            listener: None,
            events_tx,
            events_rx,
            pdf_polls: HashMap::new(),
            login_email: String::new(),
            pending_initial_load: signed_in,
            needs_load: false,
        };
        if !signed_in {
            app.begin_login("Sign in to the back-office");
        }
        app
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn is_connected(&self) -> bool {
        self.listener.as_ref().is_some_and(ListenerHandle::is_connected)
    }

    pub fn polls_in_flight(&self) -> usize {
        self.pdf_polls.len()
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    fn begin_login(&mut self, message: &str) {
        self.status_message = message.to_string();
        self.login_email.clear();
        self.open_input(InputPurpose::LoginEmail, "Email: ");
    }

    async fn submit_login(&mut self, password: String) -> Result<()> {
        match self.api.login(&self.login_email, &password).await {
            Ok(login) => {
                self.session.store(&login.token)?;
                self.api.set_token(Some(&login.token));
                info!(user = %login.user.email, "signed in");
                self.status_message = format!("Signed in as {}", login.user.name);
                self.user = Some(login.user);
                self.pending_initial_load = true;
                self.cancel_input();
                Ok(())
            }
            Err(ApiError::Unauthorized | ApiError::Validation { .. }) => {
                warn!(email = %self.login_email, "login rejected");
                self.begin_login("Invalid email or password");
                Ok(())
            }
            Err(err) => {
                self.begin_login("Sign in to the back-office");
                Err(err.into())
            }
        }
    }

    pub async fn logout(&mut self) {
        if let Err(err) = self.api.logout().await {
            warn!(error = %err, "logout request failed");
        }
        self.end_session("Signed out");
    }

    /// Forgets the token and everything loaded with it, then asks for credentials again.
    fn end_session(&mut self, message: &str) {
        if let Err(err) = self.session.clear() {
            warn!(error = %err, "could not remove stored token");
        }
        self.api.set_token(None);
        // Dropping the handle unsubscribes and closes the socket in the background.
        self.listener = None;
        self.pdf_polls.clear();
        while self.events_rx.try_recv().is_ok() {}
        self.notifications = NotificationFeed::new(self.config.notifications.max_items);
        self.user = None;
        self.stats = None;
        self.quotes.reset();
        self.projects.reset();
        self.categories.reset();
        self.users.reset();
        self.reviews.reset();
        self.messages.reset();
        self.selected_index = 0;
        self.current_section = MenuSection::Dashboard;
        self.pending_initial_load = false;
        self.begin_login(message);
    }

    fn start_listener(&mut self) {
        if self.listener.as_ref().is_some_and(|l| !l.is_finished()) {
            return;
        }
        let cfg = &self.config.broadcast;
        if !cfg.enabled || cfg.key.is_empty() {
            info!("live notifications disabled");
            return;
        }
        let listener = BroadcastListener::new(
            ListenerSettings::from(cfg),
            self.api.http().clone(),
            self.session.token().map(str::to_string),
        );
        self.listener = Some(listener.spawn(self.events_tx.clone()));
    }

    pub async fn shutdown(&mut self) {
        self.pdf_polls.clear();
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
    }

    // ------------------------------------------------------------------
    // Background events
    // ------------------------------------------------------------------

    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_broadcast(event);
        }
    }

    pub fn handle_broadcast(&mut self, event: BroadcastEvent) {
        if !self.is_signed_in() {
            // Leftovers from the listener of a session that has ended
            debug!(?event, "dropping broadcast event while signed out");
            return;
        }
        match event {
            BroadcastEvent::Connected { .. } => {
                self.status_message = "Live notifications connected".to_string();
            }
            BroadcastEvent::Subscribed { channel } => {
                info!(%channel, "listening for notifications");
            }
            BroadcastEvent::Notification(payload) => {
                let item = self.notifications.push_payload(payload);
                self.status_message = format!("🔔 {} - {}", item.title, item.message);
                if self.config.notifications.desktop_alerts {
                    desktop_alert(&item.title, &item.message);
                }
            }
            BroadcastEvent::Disconnected { reason } => {
                self.status_message = format!("Live notifications offline: {reason}");
            }
        }
    }

    pub fn check_polls(&mut self) {
        let mut finished = Vec::new();
        for (quote_id, handle) in &self.pdf_polls {
            match handle.state() {
                Readiness::Pending { .. } => {}
                Readiness::Ready { url } => finished.push((*quote_id, Ok(url))),
                Readiness::Failed { reason } => finished.push((*quote_id, Err(reason))),
            }
        }
        for (quote_id, outcome) in finished {
            self.pdf_polls.remove(&quote_id);
            match outcome {
                Ok(url) => {
                    if let Some(quote) = self.quotes.items.iter_mut().find(|q| q.id == quote_id) {
                        quote.pdf_url = Some(url.clone());
                    }
                    self.status_message = format!("PDF ready for quote #{quote_id}: {url}");
                }
                Err(reason) => {
                    self.status_message = format!("PDF for quote #{quote_id} failed: {reason}");
                }
            }
        }
    }

    pub async fn auto_refresh(&mut self) -> Result<()> {
        self.drain_events();
        self.check_polls();

        if !self.is_signed_in() {
            return Ok(());
        }

        if self.pending_initial_load {
            // Initial fetch after the first frame so the UI shows up immediately
            self.pending_initial_load = false;
            self.start_listener();
            if self.user.is_none() {
                self.user = Some(self.api.me().await?);
            }
            self.stats = Some(self.api.dashboard_stats().await?);
            self.last_refresh = Instant::now();
        }

        if self.needs_load {
            self.needs_load = false;
            self.refresh().await?;
        }

        if self.current_section == MenuSection::Dashboard && self.last_refresh.elapsed() > STATS_REFRESH {
            self.last_refresh = Instant::now();
            self.stats = Some(self.api.dashboard_stats().await?);
        }
        Ok(())
    }

    pub fn report_error(&mut self, context: &str, err: anyhow::Error) {
        if let Some(api_err) = err.downcast_ref::<ApiError>() {
            if api_err.is_auth_failure() {
                warn!(context, "session rejected by the API");
                self.end_session("Session expired, please sign in again");
                return;
            }
            error!(context, error = %api_err, "request failed");
            self.status_message = format!("{}: {}", context, api_err.user_message());
            return;
        }
        error!(context, error = %format!("{err:#}"), "action failed");
        self.status_message = format!("{}: {}", context, err);
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn set_section(&mut self, section: MenuSection) {
        if !self.is_signed_in() {
            return;
        }
        self.current_section = section;
        self.selected_index = 0;
        self.needs_load = !self.section_loaded(section);
    }

    pub fn next_section(&mut self) {
        let next = (self.current_section.position() + 1) % MenuSection::ALL.len();
        self.set_section(MenuSection::ALL[next]);
    }

    pub fn previous_section(&mut self) {
        let len = MenuSection::ALL.len();
        let prev = (self.current_section.position() + len - 1) % len;
        self.set_section(MenuSection::ALL[prev]);
    }

    fn section_loaded(&self, section: MenuSection) -> bool {
        match section {
            MenuSection::Dashboard | MenuSection::Notifications => true,
            MenuSection::Quotes => self.quotes.loaded,
            MenuSection::Projects => self.projects.loaded,
            MenuSection::Categories => self.categories.loaded,
            MenuSection::Users => self.users.loaded,
            MenuSection::Reviews => self.reviews.loaded,
            MenuSection::Messages => self.messages.loaded,
        }
    }

    pub fn next_item(&mut self) {
        let max = self.get_current_list_len();
        if max > 0 {
            self.selected_index = (self.selected_index + 1) % max;
        }
    }

    pub fn previous_item(&mut self) {
        let max = self.get_current_list_len();
        if max > 0 {
            self.selected_index = if self.selected_index == 0 {
                max - 1
            } else {
                self.selected_index - 1
            };
        }
    }

    pub fn page_up(&mut self) {
        self.selected_index = self.selected_index.saturating_sub(10);
    }

    pub fn page_down(&mut self) {
        let len = self.get_current_list_len();
        if len == 0 {
            return;
        }
        self.selected_index = usize::min(self.selected_index.saturating_add(10), len - 1);
    }

    pub fn go_home(&mut self) {
        self.selected_index = 0;
    }

    pub fn go_end(&mut self) {
        self.selected_index = self.get_current_list_len().saturating_sub(1);
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    fn get_current_list_len(&self) -> usize {
        match self.current_section {
            MenuSection::Dashboard => 0,
            MenuSection::Notifications => self.notifications.len(),
            MenuSection::Quotes => self.quotes.items.len(),
            MenuSection::Projects => self.projects.items.len(),
            MenuSection::Categories => self.categories.items.len(),
            MenuSection::Users => self.users.items.len(),
            MenuSection::Reviews => self.reviews.items.len(),
            MenuSection::Messages => self.messages.items.len(),
        }
    }

    fn selected_id(&self) -> Option<u64> {
        let i = self.selected_index;
        match self.current_section {
            MenuSection::Quotes => self.quotes.items.get(i).map(Listed::id),
            MenuSection::Projects => self.projects.items.get(i).map(Listed::id),
            MenuSection::Categories => self.categories.items.get(i).map(Listed::id),
            MenuSection::Users => self.users.items.get(i).map(Listed::id),
            MenuSection::Reviews => self.reviews.items.get(i).map(Listed::id),
            MenuSection::Messages => self.messages.items.get(i).map(Listed::id),
            MenuSection::Dashboard | MenuSection::Notifications => None,
        }
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    pub async fn refresh(&mut self) -> Result<()> {
        match self.current_section {
            MenuSection::Dashboard => {
                self.start_listener();
                self.stats = Some(self.api.dashboard_stats().await?);
                self.last_refresh = Instant::now();
                self.status_message = "Refreshed dashboard".to_string();
            }
            MenuSection::Notifications => {
                self.status_message = format!("{} notifications, {} unread", self.notifications.len(), self.notifications.unread());
            }
            section => {
                self.reload_list(section).await?;
                self.status_message = format!("Refreshed {}", section.title().to_lowercase());
            }
        }
        self.clamp_selection();
        Ok(())
    }

    async fn reload_list(&mut self, section: MenuSection) -> Result<(), ApiError> {
        match section {
            MenuSection::Quotes => self.quotes.reload(&self.api).await,
            MenuSection::Projects => self.projects.reload(&self.api).await,
            MenuSection::Categories => self.categories.reload(&self.api).await,
            MenuSection::Users => self.users.reload(&self.api).await,
            MenuSection::Reviews => self.reviews.reload(&self.api).await,
            MenuSection::Messages => self.messages.reload(&self.api).await,
            MenuSection::Dashboard | MenuSection::Notifications => Ok(()),
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.get_current_list_len();
        if self.selected_index >= len {
            self.selected_index = len.saturating_sub(1);
        }
    }

    pub async fn next_page(&mut self) -> Result<()> {
        let moved = match self.current_section {
            MenuSection::Quotes => self.quotes.next_page(),
            MenuSection::Projects => self.projects.next_page(),
            MenuSection::Categories => self.categories.next_page(),
            MenuSection::Users => self.users.next_page(),
            MenuSection::Reviews => self.reviews.next_page(),
            MenuSection::Messages => self.messages.next_page(),
            MenuSection::Dashboard | MenuSection::Notifications => false,
        };
        if moved {
            self.selected_index = 0;
            self.refresh().await?;
        }
        Ok(())
    }

    pub async fn previous_page(&mut self) -> Result<()> {
        let moved = match self.current_section {
            MenuSection::Quotes => self.quotes.prev_page(),
            MenuSection::Projects => self.projects.prev_page(),
            MenuSection::Categories => self.categories.prev_page(),
            MenuSection::Users => self.users.prev_page(),
            MenuSection::Reviews => self.reviews.prev_page(),
            MenuSection::Messages => self.messages.prev_page(),
            MenuSection::Dashboard | MenuSection::Notifications => false,
        };
        if moved {
            self.selected_index = 0;
            self.refresh().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    pub fn clear_notifications(&mut self) {
        self.notifications.clear();
        self.selected_index = 0;
        self.status_message = "Notifications cleared".to_string();
    }

    pub fn mark_notifications_read(&mut self) {
        self.notifications.mark_read();
        self.status_message = "Notifications marked as read".to_string();
    }

    pub async fn activate_item(&mut self) -> Result<()> {
        match self.current_section {
            MenuSection::Messages => {
                let Some(message) = self.messages.items.get(self.selected_index) else { return Ok(()) };
                if !message.is_read {
                    let id = message.id;
                    self.api.mark_message_read(id).await?;
                    if let Some(m) = self.messages.items.get_mut(self.selected_index) {
                        m.is_read = true;
                    }
                    self.status_message = format!("Message #{id} marked as read");
                }
                self.show_detail = true;
            }
            MenuSection::Quotes if !self.show_detail => {
                let Some(id) = self.selected_id() else { return Ok(()) };
                let fresh: Quote = self.api.get(Resource::Quotes, id).await?;
                if let Some(q) = self.quotes.items.get_mut(self.selected_index) {
                    *q = fresh;
                }
                self.show_detail = true;
            }
            MenuSection::Dashboard => {}
            _ => self.toggle_detail(),
        }
        Ok(())
    }

    pub async fn generate_pdf(&mut self) -> Result<()> {
        if self.current_section != MenuSection::Quotes {
            return Ok(());
        }
        let Some(quote_id) = self.selected_id() else { return Ok(()) };
        if self.pdf_polls.contains_key(&quote_id) {
            self.status_message = format!("PDF for quote #{quote_id} is already being generated");
            return Ok(());
        }
        self.api.generate_quote_pdf(quote_id).await?;
        let handle = polling::spawn(
            QuotePdfSource::new(self.api.clone(), quote_id),
            PollSettings::from(&self.config.polling),
        );
        self.pdf_polls.insert(quote_id, handle);
        self.status_message = format!("Generating PDF for quote #{quote_id}...");
        Ok(())
    }

    pub async fn cycle_quote_status(&mut self) -> Result<()> {
        if self.current_section != MenuSection::Quotes {
            return Ok(());
        }
        let Some(quote) = self.quotes.items.get(self.selected_index) else { return Ok(()) };
        let (id, next) = (quote.id, quote.status.next());
        self.api.update_quote_status(id, next).await?;
        if let Some(q) = self.quotes.items.get_mut(self.selected_index) {
            q.status = next;
        }
        self.status_message = format!("Quote #{id} is now {next}");
        Ok(())
    }

    pub async fn toggle_review_approval(&mut self) -> Result<()> {
        if self.current_section != MenuSection::Reviews {
            return Ok(());
        }
        let Some(review) = self.reviews.items.get(self.selected_index) else { return Ok(()) };
        let (id, approved) = (review.id, !review.is_approved);
        self.api.set_review_approval(id, approved).await?;
        if let Some(r) = self.reviews.items.get_mut(self.selected_index) {
            r.is_approved = approved;
        }
        self.status_message = if approved {
            format!("Review #{id} approved")
        } else {
            format!("Review #{id} hidden")
        };
        Ok(())
    }

    pub async fn cycle_locale(&mut self) -> Result<()> {
        let locale = self.config.api.locale.next();
        self.config.set_locale(locale)?;
        self.api.set_locale(locale);
        self.status_message = format!("Language: {}", locale.label());
        if self.current_section.resource().is_some() {
            self.refresh().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Input & confirm
    // ------------------------------------------------------------------

    fn open_input(&mut self, purpose: InputPurpose, prompt: &str) {
        self.state = AppState::Input;
        self.input_purpose = purpose;
        self.input_prompt = prompt.to_string();
        self.input_buffer.clear();
        self.input_cursor = 0;
    }

    pub fn open_search(&mut self) {
        if self.current_section.resource().is_some() {
            self.open_input(InputPurpose::Search, "Search: ");
        }
    }

    pub fn new_item(&mut self) {
        let prompt = match self.current_section {
            MenuSection::Categories => "New category (name|description): ",
            MenuSection::Projects => "New project (title|category id|description): ",
            MenuSection::Users => "New user (name|email|password|role): ",
            _ => return,
        };
        self.open_input(InputPurpose::NewItem, prompt);
    }

    pub fn edit_item(&mut self) {
        if self.current_section != MenuSection::Categories {
            return;
        }
        let Some(category) = self.categories.items.get(self.selected_index) else { return };
        let current = category.name.clone();
        self.open_input(InputPurpose::EditItem, "Rename category: ");
        self.input_cursor = current.chars().count();
        self.input_buffer = current;
    }

    pub fn open_upload(&mut self) {
        if self.current_section == MenuSection::Projects && self.selected_id().is_some() {
            self.open_input(InputPurpose::UploadImage, "Image file path: ");
        }
    }

    pub fn delete_item(&mut self) {
        let Some(id) = self.selected_id() else { return };
        self.state = AppState::Confirm;
        self.confirm_message = format!(
            "Delete {} #{}? (y/n)",
            self.current_section.title().trim_end_matches('s').to_lowercase(),
            id
        );
    }

    pub fn cancel_input(&mut self) {
        if !self.is_signed_in() {
            // No way out of the login prompt; Esc on the password goes back to the email
            if self.input_purpose == InputPurpose::LoginPassword {
                self.begin_login("Sign in to the back-office");
            } else {
                self.input_buffer.clear();
                self.input_cursor = 0;
            }
            return;
        }
        self.state = AppState::Normal;
        self.input_buffer.clear();
        self.input_cursor = 0;
    }

    pub fn is_login_prompt(&self) -> bool {
        self.state == AppState::Input
            && matches!(self.input_purpose, InputPurpose::LoginEmail | InputPurpose::LoginPassword)
    }

    pub async fn submit_input(&mut self) -> Result<()> {
        let input = self.input_buffer.trim().to_string();
        match self.input_purpose {
            InputPurpose::LoginEmail => {
                if input.is_empty() {
                    return Ok(());
                }
                self.login_email = input;
                self.open_input(InputPurpose::LoginPassword, "Password: ");
                return Ok(());
            }
            InputPurpose::LoginPassword => {
                // Passwords are taken verbatim, surrounding spaces included
                let password = std::mem::take(&mut self.input_buffer);
                return self.submit_login(password).await;
            }
            InputPurpose::Search => {
                self.cancel_input();
                match self.current_section {
                    MenuSection::Quotes => self.quotes.set_search(&input),
                    MenuSection::Projects => self.projects.set_search(&input),
                    MenuSection::Categories => self.categories.set_search(&input),
                    MenuSection::Users => self.users.set_search(&input),
                    MenuSection::Reviews => self.reviews.set_search(&input),
                    MenuSection::Messages => self.messages.set_search(&input),
                    MenuSection::Dashboard | MenuSection::Notifications => {}
                }
                self.selected_index = 0;
                self.refresh().await?;
            }
            InputPurpose::NewItem => {
                self.cancel_input();
                self.create_from_string(&input).await?;
                self.refresh().await?;
            }
            InputPurpose::EditItem => {
                self.cancel_input();
                if let Some(id) = self.selected_id() {
                    let _: Category = self
                        .api
                        .update(Resource::Categories, id, &NewCategory { name: input.clone(), description: None })
                        .await?;
                    self.status_message = format!("Category renamed to {input}");
                    self.refresh().await?;
                }
            }
            InputPurpose::UploadImage => {
                self.cancel_input();
                if let Some(id) = self.selected_id() {
                    let image = self.api.upload_project_image(id, &PathBuf::from(&input)).await?;
                    self.refresh().await?;
                    self.status_message = format!("Uploaded image #{} to project #{id}", image.id);
                }
            }
        }
        Ok(())
    }

    async fn create_from_string(&mut self, input: &str) -> Result<()> {
        let parts: Vec<&str> = input.split('|').map(str::trim).collect();
        let field = |i: usize| parts.get(i).copied().filter(|s| !s.is_empty()).map(str::to_string);
        match self.current_section {
            MenuSection::Categories => {
                let name = field(0).context("Category name is required")?;
                let created: Category = self
                    .api
                    .create(Resource::Categories, &NewCategory { name, description: field(1) })
                    .await?;
                self.status_message = format!("Category '{}' created", created.name);
            }
            MenuSection::Projects => {
                let title = field(0).context("Project title is required")?;
                let category_id = field(1)
                    .map(|raw| raw.parse::<u64>())
                    .transpose()
                    .context("Category id must be a number")?;
                let created: Project = self
                    .api
                    .create(Resource::Projects, &NewProject { title, category_id, description: field(2) })
                    .await?;
                self.status_message = format!("Project '{}' created", created.title);
            }
            MenuSection::Users => {
                let name = field(0).context("Name is required")?;
                let email = field(1).context("Email is required")?;
                let password = field(2).context("Password is required")?;
                let created: User = self
                    .api
                    .create(Resource::Users, &NewUser { name, email, password, role: field(3) })
                    .await?;
                self.status_message = format!("User {} created", created.email);
            }
            _ => {}
        }
        Ok(())
    }

    pub async fn confirm_action(&mut self) -> Result<()> {
        self.cancel_confirm();
        let (Some(resource), Some(id)) = (self.current_section.resource(), self.selected_id()) else {
            return Ok(());
        };
        self.api.delete(resource, id).await?;
        if resource == Resource::Quotes {
            self.pdf_polls.remove(&id);
        }
        self.status_message = format!("Deleted #{id}");
        self.refresh().await
    }

    pub fn cancel_confirm(&mut self) {
        self.state = AppState::Normal;
        self.confirm_message.clear();
    }

    fn input_byte_index(&self) -> usize {
        self.input_buffer
            .char_indices()
            .nth(self.input_cursor)
            .map(|(i, _)| i)
            .unwrap_or(self.input_buffer.len())
    }

    pub fn input_char(&mut self, c: char) {
        let at = self.input_byte_index();
        self.input_buffer.insert(at, c);
        self.input_cursor += 1;
    }

    pub fn input_backspace(&mut self) {
        if self.input_cursor > 0 {
            self.input_cursor -= 1;
            let at = self.input_byte_index();
            self.input_buffer.remove(at);
        }
    }

    pub fn input_move_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn input_move_right(&mut self) {
        if self.input_cursor < self.input_buffer.chars().count() {
            self.input_cursor += 1;
        }
    }

    pub fn masked_input(&self) -> String {
        if self.input_purpose == InputPurpose::LoginPassword {
            "*".repeat(self.input_buffer.chars().count())
        } else {
            self.input_buffer.clone()
        }
    }
}

#[cfg(feature = "desktop-alerts")]
fn desktop_alert(title: &str, body: &str) {
    if let Err(err) = notify_rust::Notification::new()
        .appname("atelier")
        .summary(title)
        .body(body)
        .show()
    {
        warn!(error = %err, "desktop alert failed");
    }
}

#[cfg(not(feature = "desktop-alerts"))]
fn desktop_alert(_title: &str, _body: &str) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::notifications::NotificationPayload;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app_at(dir: &std::path::Path, base_url: &str, token: Option<&str>) -> App {
        let mut config = Config::parse(dir.join("config.toml"), "").unwrap();
        config.api.base_url = base_url.to_string();
        config.broadcast.enabled = false;
        let mut session = Session::load(dir).unwrap();
        if let Some(token) = token {
            session.store(token).unwrap();
        }
        let api = ApiClient::new(&config.api, session.token()).unwrap();
        App::with_parts(config, session, api)
    }

    fn payload(title: &str) -> BroadcastEvent {
        BroadcastEvent::Notification(NotificationPayload {
            title: title.to_string(),
            message: "Client X submitted a request".to_string(),
            kind: "contact".to_string(),
            timestamp: None,
        })
    }

    #[test]
    fn starts_on_login_prompt_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_at(dir.path(), "http://127.0.0.1:9", None);
        assert!(app.is_login_prompt());
        assert_eq!(app.input_purpose, InputPurpose::LoginEmail);
    }

    #[tokio::test]
    async fn broadcast_events_feed_the_notification_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_at(dir.path(), "http://127.0.0.1:9", Some("t"));

        app.events_tx.send(payload("New quote")).await.unwrap();
        app.events_tx.send(payload("New review")).await.unwrap();
        app.drain_events();

        assert_eq!(app.notifications.len(), 2);
        assert_eq!(app.notifications.unread(), 2);
        assert_eq!(app.notifications.items()[0].title, "New review");

        app.mark_notifications_read();
        assert_eq!(app.notifications.len(), 2);
        assert_eq!(app.notifications.unread(), 0);

        app.clear_notifications();
        assert!(app.notifications.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_error_signs_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_at(dir.path(), "http://127.0.0.1:9", Some("stale"));
        assert!(app.is_signed_in());

        app.report_error("Refresh failed", ApiError::Unauthorized.into());

        assert!(!app.is_signed_in());
        assert!(!dir.path().join("token").exists());
        assert!(app.is_login_prompt());
        assert!(app.status_message.contains("Session expired"));
    }

    #[tokio::test]
    async fn sign_out_starts_the_next_session_clean() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_at(dir.path(), "http://127.0.0.1:9", Some("stale"));
        app.handle_broadcast(payload("New quote"));
        app.events_tx.send(payload("Queued before sign-out")).await.unwrap();
        assert_eq!(app.notifications.unread(), 1);

        app.report_error("Refresh failed", ApiError::Unauthorized.into());
        assert!(app.notifications.is_empty());
        assert_eq!(app.notifications.unread(), 0);

        // The old listener reports its teardown after the session is gone
        app.events_tx
            .send(BroadcastEvent::Disconnected { reason: "stopped".to_string() })
            .await
            .unwrap();
        app.events_tx.send(payload("Late arrival")).await.unwrap();
        app.drain_events();

        assert!(app.notifications.is_empty());
        assert_eq!(app.status_message, "Session expired, please sign in again");
    }

    #[tokio::test]
    async fn opening_a_quote_fetches_it_fresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/quotes/9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": 9, "client_name": "Omar", "email": "o@x.ma",
                         "status": "accepted", "pdf_url": "https://files.atelier.test/q9.pdf"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut app = app_at(dir.path(), &server.uri(), Some("t"));
        app.current_section = MenuSection::Quotes;
        app.quotes.items.push(Quote { id: 9, client_name: "Omar".into(), ..Default::default() });

        app.activate_item().await.unwrap();

        assert!(app.show_detail);
        assert_eq!(app.quotes.items[0].pdf_url.as_deref(), Some("https://files.atelier.test/q9.pdf"));
        assert_eq!(app.quotes.items[0].status.as_str(), "accepted");
    }

    #[tokio::test]
    async fn other_errors_only_reach_the_status_bar() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_at(dir.path(), "http://127.0.0.1:9", Some("t"));
        app.report_error("Delete failed", ApiError::NotFound("gone".into()).into());
        assert!(app.is_signed_in());
        assert_eq!(app.status_message, "Delete failed: Not found: gone");
    }

    #[tokio::test]
    async fn login_flow_stores_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "fresh",
                "user": {"id": 1, "name": "Nadia", "email": "nadia@atelier.test"}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut app = app_at(dir.path(), &server.uri(), None);
        for c in "nadia@atelier.test".chars() {
            app.input_char(c);
        }
        app.submit_input().await.unwrap();
        assert_eq!(app.input_purpose, InputPurpose::LoginPassword);
        for c in "s3cret".chars() {
            app.input_char(c);
        }
        assert_eq!(app.masked_input(), "******");
        app.submit_input().await.unwrap();

        assert!(app.is_signed_in());
        assert_eq!(app.state, AppState::Normal);
        assert_eq!(std::fs::read_to_string(dir.path().join("token")).unwrap(), "fresh");
        assert_eq!(app.user.as_ref().map(|u| u.name.as_str()), Some("Nadia"));
    }

    #[tokio::test]
    async fn rejected_login_asks_again() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid"})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut app = app_at(dir.path(), &server.uri(), None);
        app.input_char('a');
        app.submit_input().await.unwrap();
        app.input_char('b');
        app.submit_input().await.unwrap();

        assert!(!app.is_signed_in());
        assert_eq!(app.input_purpose, InputPurpose::LoginEmail);
        assert_eq!(app.status_message, "Invalid email or password");
    }

    #[tokio::test]
    async fn section_switch_loads_list_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/reviews"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": 1, "client_name": "Hamza", "rating": 5, "is_approved": false},
                    {"id": 2, "client_name": "Léa", "rating": 3, "is_approved": true}
                ],
                "current_page": 1, "last_page": 1, "total": 2
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/admin/reviews/1/approval"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut app = app_at(dir.path(), &server.uri(), Some("t"));
        app.pending_initial_load = false;

        app.set_section(MenuSection::Reviews);
        app.auto_refresh().await.unwrap();
        assert_eq!(app.reviews.items.len(), 2);

        app.set_section(MenuSection::Dashboard);
        app.set_section(MenuSection::Reviews);
        app.auto_refresh().await.unwrap();

        app.toggle_review_approval().await.unwrap();
        assert!(app.reviews.items[0].is_approved);
    }

    #[test]
    fn input_editing_handles_multibyte_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_at(dir.path(), "http://127.0.0.1:9", None);
        for c in "chêne".chars() {
            app.input_char(c);
        }
        app.input_move_left();
        app.input_move_left();
        app.input_backspace();
        assert_eq!(app.input_buffer, "chne");
        app.input_char('ê');
        assert_eq!(app.input_buffer, "chêne");
    }

    #[test]
    fn sections_cycle_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_at(dir.path(), "http://127.0.0.1:9", Some("t"));
        app.previous_section();
        assert_eq!(app.current_section, MenuSection::Messages);
        app.next_section();
        app.next_section();
        assert_eq!(app.current_section, MenuSection::Notifications);
    }
}
