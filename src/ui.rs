use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, AppState, MenuSection};
use crate::modules::resources::{Listed, ResourceList};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(4),
        ])
        .split(f.area());

    draw_title(f, chunks[0], app);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(20), Constraint::Percentage(80)])
        .split(chunks[1]);

    draw_menu(f, app, main_chunks[0]);

    let area = main_chunks[1];
    if !app.is_signed_in() {
        draw_signed_out(f, area);
    } else {
        match app.current_section {
            MenuSection::Dashboard => draw_dashboard(f, app, area),
            MenuSection::Notifications => draw_notifications(f, app, area),
            MenuSection::Quotes => draw_resource(f, app, area, "Quotes", &app.quotes),
            MenuSection::Projects => draw_resource(f, app, area, "Projects", &app.projects),
            MenuSection::Categories => draw_resource(f, app, area, "Categories", &app.categories),
            MenuSection::Users => draw_resource(f, app, area, "Users", &app.users),
            MenuSection::Reviews => draw_resource(f, app, area, "Reviews", &app.reviews),
            MenuSection::Messages => draw_resource(f, app, area, "Messages", &app.messages),
        }
    }

    draw_status(f, app, chunks[2]);

    if app.state == AppState::Input {
        draw_input_popup(f, app);
    } else if app.state == AppState::Confirm {
        draw_confirm_popup(f, app);
    } else if app.show_help {
        draw_help_popup(f);
    }
}

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let time_str = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let user = app
        .user
        .as_ref()
        .map(|u| u.name.as_str())
        .unwrap_or("signed out");
    let locale = app.config.api.locale;
    let direction = if locale.is_rtl() { " ⇐ RTL" } else { "" };

    let (dot, dot_color) = if app.is_connected() {
        ("● live", Color::Green)
    } else {
        ("○ offline", Color::DarkGray)
    };

    let mut spans = vec![
        Span::styled("atelier", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(format!(" | {} | {}{} | ", user, locale.label(), direction)),
        Span::styled(dot, Style::default().fg(dot_color)),
        Span::raw(format!(" | {}", time_str)),
    ];
    if app.polls_in_flight() > 0 {
        spans.push(Span::styled(
            format!(" | ⏳ {} PDF", app.polls_in_flight()),
            Style::default().fg(Color::Yellow),
        ));
    }

    let title = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(title, area);
}

fn draw_menu(f: &mut Frame, app: &App, area: Rect) {
    let unread = app.notifications.unread();
    let items: Vec<ListItem> = MenuSection::ALL
        .iter()
        .enumerate()
        .map(|(i, section)| {
            let style = if *section == app.current_section {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let mut spans = vec![Span::styled(format!("{} {}", i + 1, section.title()), style)];
            if *section == MenuSection::Notifications && unread > 0 {
                spans.push(Span::styled(
                    format!(" ({})", unread),
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title("Menu")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(list, area);
}

fn draw_signed_out(f: &mut Frame, area: Rect) {
    let text = "Signed out.\n\nEnter your administrator email and password to continue.";
    let paragraph = Paragraph::new(text)
        .block(Block::default().title("Sign in").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn draw_dashboard(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(0)])
        .split(area);

    let stats_text = match &app.stats {
        Some(s) => vec![
            Line::from(format!("Projects:          {}", s.projects)),
            Line::from(format!("Quotes:            {}", s.quotes)),
            Line::from(vec![
                Span::raw("Pending quotes:    "),
                highlighted(s.pending_quotes),
            ]),
            Line::from(vec![
                Span::raw("Unread messages:   "),
                highlighted(s.unread_messages),
            ]),
            Line::from(vec![
                Span::raw("Pending reviews:   "),
                highlighted(s.pending_reviews),
            ]),
            Line::from(format!("Users:             {}", s.users)),
        ],
        None => vec![Line::from("Loading statistics...")],
    };
    let stats = Paragraph::new(stats_text)
        .block(Block::default().title("Overview").borders(Borders::ALL));
    f.render_widget(stats, chunks[0]);

    let recent: Vec<ListItem> = app
        .notifications
        .items()
        .iter()
        .take(chunks[1].height.saturating_sub(2) as usize)
        .map(|n| ListItem::new(format!("[{}] {} - {}", n.time_label(), n.title, n.message)))
        .collect();

    let title = format!("Recent notifications ({} unread)", app.notifications.unread());
    if recent.is_empty() {
        let empty = Paragraph::new("Nothing yet. New quotes, messages and reviews show up here live.")
            .block(Block::default().title(title).borders(Borders::ALL))
            .wrap(Wrap { trim: false });
        f.render_widget(empty, chunks[1]);
    } else {
        let list = List::new(recent).block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(list, chunks[1]);
    }
}

fn highlighted(value: u64) -> Span<'static> {
    let style = if value > 0 {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Span::styled(value.to_string(), style)
}

fn kind_icon(kind: &str) -> &'static str {
    match kind {
        "quote" => "📝",
        "contact" | "message" => "✉️",
        "review" => "⭐",
        "error" => "❌",
        "warning" => "⚠️",
        "info" => "ℹ️",
        _ => "📢",
    }
}

fn draw_notifications(f: &mut Frame, app: &App, area: Rect) {
    let area = if app.show_detail {
        let split = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(area);
        draw_notification_detail(f, app, split[1]);
        split[0]
    } else {
        area
    };

    let list_height = area.height.saturating_sub(2) as usize;
    let start = app.selected_index.saturating_sub(list_height / 2);

    let items: Vec<ListItem> = app
        .notifications
        .items()
        .iter()
        .enumerate()
        .skip(start)
        .take(list_height)
        .map(|(i, n)| {
            let style = if i == app.selected_index {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(
                "{} [{}] {} - {}",
                kind_icon(&n.kind),
                n.time_label(),
                n.title,
                n.message
            ))
            .style(style)
        })
        .collect();

    let title = format!(
        "Notifications ({} unread) | c: clear m: mark read",
        app.notifications.unread()
    );
    if items.is_empty() {
        let empty = Paragraph::new("No notifications yet")
            .block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(empty, area);
    } else {
        let list = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(list, area);
    }
}

fn draw_notification_detail(f: &mut Frame, app: &App, area: Rect) {
    let lines: Vec<Line> = match app.notifications.items().get(app.selected_index) {
        Some(n) => vec![
            Line::from(format!("{} {}", kind_icon(&n.kind), n.title)),
            Line::from(format!("Type: {}", n.kind)),
            Line::from(format!("Received: {}", n.received_at.format("%Y-%m-%d %H:%M:%S"))),
            Line::from(format!("Sent: {}", n.sent_at.as_deref().unwrap_or("-"))),
            Line::from(""),
            Line::from(n.message.as_str()),
        ],
        None => vec![Line::from("No notification selected")],
    };
    let detail = Paragraph::new(lines)
        .block(Block::default().title("Details").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(detail, area);
}

fn draw_resource<T: Listed>(f: &mut Frame, app: &App, area: Rect, name: &str, list: &ResourceList<T>) {
    let (list_area, detail_area) = if app.show_detail {
        let split = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(area);
        (split[0], Some(split[1]))
    } else {
        (area, None)
    };

    let title = format!("{} | {}", name, list.page_label());
    if !list.loaded {
        let loading = Paragraph::new(format!("Loading {}...", name.to_lowercase()))
            .block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(loading, list_area);
        return;
    }

    let list_height = list_area.height.saturating_sub(2) as usize;
    let start = app.selected_index.saturating_sub(list_height / 2);
    let items: Vec<ListItem> = list
        .items
        .iter()
        .enumerate()
        .skip(start)
        .take(list_height)
        .map(|(i, item)| {
            let style = if i == app.selected_index {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!("#{} {}", item.id(), item.label())).style(style)
        })
        .collect();

    if items.is_empty() {
        let empty = Paragraph::new(format!("No {} found", name.to_lowercase()))
            .block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(empty, list_area);
    } else {
        let widget = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(widget, list_area);
    }

    if let Some(detail_area) = detail_area {
        let lines: Vec<Line> = list
            .items
            .get(app.selected_index)
            .map(|item| item.detail().into_iter().map(Line::from).collect())
            .unwrap_or_default();
        let detail = Paragraph::new(lines)
            .block(Block::default().title("Details").borders(Borders::ALL))
            .wrap(Wrap { trim: false });
        f.render_widget(detail, detail_area);
    }
}

fn section_keys(section: MenuSection) -> &'static str {
    match section {
        MenuSection::Notifications => "c: Clear | m: Mark read",
        MenuSection::Quotes => "p: PDF | s: Next status | d: Delete",
        MenuSection::Projects => "n: New | u: Upload image | d: Delete",
        MenuSection::Categories => "n: New | e: Rename | d: Delete",
        MenuSection::Users => "n: New | d: Delete",
        MenuSection::Reviews => "a: Approve/hide | d: Delete",
        MenuSection::Messages => "Enter: Read | d: Delete",
        MenuSection::Dashboard => "r: Refresh",
    }
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let help_text = match app.state {
        AppState::Normal => format!(
            "q: Quit | Tab/1-8: Section | ↑↓/jk: Navigate | [ ]: Page | /: Search | t: Details | {} | ?: Help",
            section_keys(app.current_section)
        ),
        AppState::Input if app.is_login_prompt() => "Enter: Submit | Esc: Back | Ctrl-C: Quit".to_string(),
        AppState::Input => "Enter: Submit | Esc: Cancel | Type your input".to_string(),
        AppState::Confirm => "y: Yes | n: No | Esc: Cancel".to_string(),
    };

    let status = Paragraph::new(vec![
        Line::from(app.status_message.as_str()),
        Line::from(help_text),
    ])
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(status, area);
}

fn draw_input_popup(f: &mut Frame, app: &App) {
    let area = centered_rect(60, 20, f.area());
    let input_text = format!("{}{}", app.input_prompt, app.masked_input());
    let title = if app.is_login_prompt() { "Sign in" } else { "Input" };
    let input = Paragraph::new(input_text)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(Clear, area);
    f.render_widget(input, area);
}

fn draw_confirm_popup(f: &mut Frame, app: &App) {
    let area = centered_rect(50, 15, f.area());
    let confirm = Paragraph::new(app.confirm_message.as_str())
        .block(
            Block::default()
                .title("Confirm")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(Clear, area);
    f.render_widget(confirm, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn draw_help_popup(f: &mut Frame) {
    let area = centered_rect(70, 80, f.area());
    let help = "atelier Help\n\n\
Keys:\n  \
q / Ctrl-C: Quit\n  \
Tab / Shift-Tab, 1-8: Switch section\n  \
j/k or ↑/↓: Navigate\n  \
PgUp/PgDn, Home/End: Page/Jump\n  \
[ / ]: Previous/next page\n  \
/: Search current list\n  \
r: Refresh\n  \
n: New item (Categories, Projects, Users)\n  \
e: Rename category\n  \
d: Delete selected item\n  \
t or Enter: Toggle details\n  \
L: Switch language (fr / en / ar)\n  \
o: Sign out\n\n\
Notifications:  c clear, m mark read\n\
Quotes:         p generate PDF, s next status\n\
Reviews:        a approve/hide\n\
Messages:       Enter mark as read\n\
Projects:       u upload image\n\n\
?: Toggle this help";

    let paragraph = Paragraph::new(help)
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}
