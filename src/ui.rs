use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use registration_reconciler::{ReconciliationReport, Session, SummaryRow, UnmatchedUnit};
use std::io;

const PAGE_STEP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Summary,
    Roster,
    Unmatched,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Summary => Page::Roster,
            Page::Roster => Page::Unmatched,
            Page::Unmatched => Page::Summary,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Summary => Page::Unmatched,
            Page::Roster => Page::Summary,
            Page::Unmatched => Page::Roster,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Summary => "Summary",
            Page::Roster => "Roster",
            Page::Unmatched => "Unmatched",
        }
    }
}

pub struct App {
    pub session: Session,
    pub current_page: Page,
    pub summary: Vec<SummaryRow>,
    pub report: ReconciliationReport,
    pub unmatched: Option<Vec<UnmatchedUnit>>,
    pub summary_state: TableState,
    pub roster_state: TableState,
    pub unmatched_state: TableState,
    pub message: Option<String>,
}

impl App {
    pub fn new(session: Session) -> Self {
        let summary = session.summary();
        let report = session.report();
        let unmatched = session.unmatched();

        let mut app = App {
            session,
            current_page: Page::Summary,
            summary,
            report,
            unmatched,
            summary_state: TableState::default(),
            roster_state: TableState::default(),
            unmatched_state: TableState::default(),
            message: None,
        };
        app.select_first();
        app
    }

    /// Recompute every view from the session
    pub fn refresh(&mut self) {
        self.summary = self.session.summary();
        self.report = self.session.report();
        self.unmatched = self.session.unmatched();
        self.summary_state = TableState::default();
        self.roster_state = TableState::default();
        self.unmatched_state = TableState::default();
        self.select_first();
    }

    pub fn reload_reference(&mut self) {
        let table = self.session.reload_reference();
        self.message = Some(match &table.load_error {
            None => format!("Reference reloaded: {} units", table.unit_count()),
            Some(err) => format!("Reference unavailable: {}", err),
        });
        self.refresh();
    }

    fn select_first(&mut self) {
        for page in [Page::Summary, Page::Roster, Page::Unmatched] {
            if self.row_count(page) > 0 {
                self.state_mut(page).select(Some(0));
            }
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn row_count(&self, page: Page) -> usize {
        match page {
            Page::Summary => self.summary.len(),
            Page::Roster => self.session.roster().len(),
            Page::Unmatched => self.unmatched.as_ref().map(Vec::len).unwrap_or(0),
        }
    }

    fn state_mut(&mut self, page: Page) -> &mut TableState {
        match page {
            Page::Summary => &mut self.summary_state,
            Page::Roster => &mut self.roster_state,
            Page::Unmatched => &mut self.unmatched_state,
        }
    }

    fn selected(&self) -> Option<usize> {
        match self.current_page {
            Page::Summary => self.summary_state.selected(),
            Page::Roster => self.roster_state.selected(),
            Page::Unmatched => self.unmatched_state.selected(),
        }
    }

    fn select(&mut self, i: usize) {
        let page = self.current_page;
        self.state_mut(page).select(Some(i));
    }

    pub fn next(&mut self) {
        let len = self.row_count(self.current_page);
        if len == 0 {
            return;
        }
        let i = match self.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.select(i);
    }

    pub fn previous(&mut self) {
        let len = self.row_count(self.current_page);
        if len == 0 {
            return;
        }
        let i = match self.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.select(i);
    }

    pub fn page_down(&mut self) {
        let len = self.row_count(self.current_page);
        if len == 0 {
            return;
        }
        let i = self.selected().map(|i| (i + PAGE_STEP).min(len - 1)).unwrap_or(0);
        self.select(i);
    }

    pub fn page_up(&mut self) {
        if self.row_count(self.current_page) == 0 {
            return;
        }
        let i = self.selected().map(|i| i.saturating_sub(PAGE_STEP)).unwrap_or(0);
        self.select(i);
    }

    pub fn home(&mut self) {
        if self.row_count(self.current_page) > 0 {
            self.select(0);
        }
    }

    pub fn end(&mut self) {
        let len = self.row_count(self.current_page);
        if len > 0 {
            self.select(len - 1);
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('r') => app.reload_reference(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.home(),
                KeyCode::End => app.end(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Summary => render_summary(f, chunks[1], app),
        Page::Roster => render_roster(f, chunks[1], app),
        Page::Unmatched => render_unmatched(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Summary, Page::Roster, Page::Unmatched].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    let status = app.session.status();
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Roster: {}", status.roster_size),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    match &status.reference_error {
        None => tab_spans.push(Span::styled(
            format!("Reference: {} units", status.reference_units),
            Style::default().fg(Color::Green),
        )),
        Some(_) => tab_spans.push(Span::styled(
            "Reference: unavailable".to_string(),
            Style::default().fg(Color::Red),
        )),
    }
    if status.reference_issues > 0 {
        let color = if status.reference_critical_issues > 0 { Color::Red } else { Color::Yellow };
        tab_spans.push(Span::raw(" "));
        tab_spans.push(Span::styled(
            format!("⚠ {} issues", status.reference_issues),
            Style::default().fg(color),
        ));
    }
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("✓ {}  ✗ {}", app.report.matched_registrants, app.report.unmatched_registrants()),
        Style::default().fg(Color::Cyan),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn table_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(title)
}

fn highlight() -> Style {
    Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
}

fn render_summary(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.summary.iter().map(|row| {
        if row.is_title() {
            Row::new(vec![
                Cell::from(row.display_text.clone())
                    .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
                Cell::from(""),
            ])
        } else {
            let color = if row.count == Some(0) { Color::DarkGray } else { Color::Green };
            Row::new(vec![
                Cell::from(truncate(&row.display_text, 30)),
                Cell::from(row.count_text()).style(Style::default().fg(color)),
            ])
        }
    });

    let table = Table::new(rows, [Constraint::Length(34), Constraint::Length(10)])
        .header(header_row(&["單位", "報名人數"]))
        .block(table_block(" Summary "))
        .highlight_style(highlight())
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.summary_state);
}

fn render_roster(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.session.roster().records().iter().map(|record| {
        Row::new(vec![
            Cell::from(truncate(&record.unit, 30)),
            Cell::from(record.name.clone()),
        ])
    });

    let table = Table::new(rows, [Constraint::Length(34), Constraint::Length(16)])
        .header(header_row(&["單位", "姓名"]))
        .block(table_block(" Roster "))
        .highlight_style(highlight())
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.roster_state);
}

fn render_unmatched(f: &mut Frame, area: Rect, app: &mut App) {
    let Some(unmatched) = &app.unmatched else {
        let notice = Paragraph::new("Unmatched reporting is disabled (report_unmatched = false)")
            .block(table_block(" Unmatched "));
        f.render_widget(notice, area);
        return;
    };

    let rows = unmatched.iter().map(|unit| {
        Row::new(vec![
            Cell::from(truncate(&unit.unit, 30)).style(Style::default().fg(Color::Red)),
            Cell::from(unit.count.to_string()),
        ])
    });

    let table = Table::new(rows, [Constraint::Length(34), Constraint::Length(10)])
        .header(header_row(&["單位", "報名人數"]))
        .block(table_block(" Unmatched "))
        .highlight_style(highlight())
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.unmatched_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.selected().map(|i| i + 1).unwrap_or(0);
    let total = app.row_count(app.current_page);

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, total),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(message) = &app.message {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(message.clone(), Style::default().fg(Color::Green)));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Fast | "));
    status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Reload reference | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

/// Truncate by characters; unit names are mostly CJK
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registration_reconciler::Config;
    use tempfile::TempDir;

    fn app_in(dir: &TempDir) -> App {
        std::fs::write(
            dir.path().join("ref.csv"),
            "代碼,單位名稱\n,北區\nTP838,富宅\nAB123,信義\n",
        )
        .unwrap();
        let config = Config {
            reference_path: dir.path().join("ref.csv"),
            master_roster_path: dir.path().join("master_data.csv"),
            ..Config::default()
        };
        App::new(Session::open(config).unwrap())
    }

    #[test]
    fn test_page_cycle() {
        assert_eq!(Page::Summary.next(), Page::Roster);
        assert_eq!(Page::Unmatched.next(), Page::Summary);
        assert_eq!(Page::Summary.previous(), Page::Unmatched);
    }

    #[test]
    fn test_navigation_wraps_and_clamps() {
        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);

        assert_eq!(app.row_count(Page::Summary), 3);
        assert_eq!(app.summary_state.selected(), Some(0));

        app.previous();
        assert_eq!(app.summary_state.selected(), Some(2));
        app.next();
        assert_eq!(app.summary_state.selected(), Some(0));
        app.page_down();
        assert_eq!(app.summary_state.selected(), Some(2));
        app.page_up();
        assert_eq!(app.summary_state.selected(), Some(0));

        // Empty roster page ignores movement
        app.next_page();
        app.next();
        assert_eq!(app.roster_state.selected(), None);
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("TP838富宅", 10), "TP838富宅");
        assert_eq!(truncate("富宅富宅富宅", 4), "富宅富…");
    }
}
