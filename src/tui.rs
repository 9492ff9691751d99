use anyhow::Result;
use chrono::{Local, NaiveDate};
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};
use std::io::stdout;

use crate::dashboard;
use crate::models::{Job, JobStatus, Origin, View};
use crate::state::{AppState, JobFilter};
use crate::store::KeyValueStore;

const DETAIL_WIDTH: usize = 70;

/// Cursor and scroll position; the view itself lives in `AppState`.
#[derive(Default)]
struct Browser {
    selected: usize,
    scroll_offset: u16,
    message: Option<String>,
}

impl Browser {
    fn next(&mut self, len: usize) {
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn clamp(&mut self, len: usize) {
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }
}

fn visible_jobs<S: KeyValueStore>(state: &AppState<S>) -> Vec<&Job> {
    state.filtered_jobs(&JobFilter::for_view(state.view()))
}

fn selected_job<'a, S: KeyValueStore>(state: &'a AppState<S>, browser: &Browser) -> Option<&'a Job> {
    visible_jobs(state).get(browser.selected).copied()
}

pub fn run_browse<S: KeyValueStore>(state: &mut AppState<S>) -> Result<()> {
    state.set_view(initial_view(state));
    let mut browser = Browser::default();

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, state, &mut browser);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

/// Opens on the application list, or the dashboard when there is nothing to list.
fn initial_view<S: KeyValueStore>(state: &AppState<S>) -> View {
    if state.list_jobs().is_empty() { View::Dashboard } else { View::Jobs }
}

fn run_loop<B: Backend, S: KeyValueStore>(
    terminal: &mut Terminal<B>,
    state: &mut AppState<S>,
    browser: &mut Browser,
) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, state, browser))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if handle_key(state, browser, key.code) {
                break;
            }
        }
    }
    Ok(())
}

/// Applies one key press. Returns true when the browser should exit.
fn handle_key<S: KeyValueStore>(state: &mut AppState<S>, browser: &mut Browser, code: KeyCode) -> bool {
    let len = visible_jobs(state).len();
    browser.message = None;
    match code {
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Tab => {
            let next = state.view().next();
            switch_view(state, browser, next);
        }
        KeyCode::Char(c @ '1'..='4') => {
            let index = c as usize - '1' as usize;
            switch_view(state, browser, View::ALL[index]);
        }
        KeyCode::Down | KeyCode::Char('j') => browser.next(len),
        KeyCode::Up | KeyCode::Char('k') => browser.prev(),
        KeyCode::Char('J') | KeyCode::PageDown => browser.scroll_down(),
        KeyCode::Char('K') | KeyCode::PageUp => browser.scroll_up(),
        KeyCode::Char('a') => set_status(state, browser, JobStatus::Applied),
        KeyCode::Char('i') => set_status(state, browser, JobStatus::Interview),
        KeyCode::Char('o') => set_status(state, browser, JobStatus::Offer),
        KeyCode::Char('x') => set_status(state, browser, JobStatus::Rejected),
        KeyCode::Char('c') => set_status(state, browser, JobStatus::Accepted),
        _ => {}
    }
    false
}

fn switch_view<S: KeyValueStore>(state: &mut AppState<S>, browser: &mut Browser, view: View) {
    if state.view() != view {
        state.set_view(view);
        browser.selected = 0;
        browser.scroll_offset = 0;
    }
}

fn set_status<S: KeyValueStore>(state: &mut AppState<S>, browser: &mut Browser, status: JobStatus) {
    if !matches!(state.view(), View::Jobs | View::Offers) {
        return;
    }
    let Some(mut job) = selected_job(state, browser).cloned() else {
        return;
    };
    job.status = status;
    browser.message = Some(match state.update_job(job) {
        Ok(_) => format!("Marked as {}", status),
        Err(e) => format!("Not saved: {}", e),
    });
    // A status change can move the job out of the Offers list.
    browser.clamp(visible_jobs(state).len());
}

fn draw<S: KeyValueStore>(frame: &mut Frame, state: &AppState<S>, browser: &Browser) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    let titles: Vec<String> = View::ALL
        .iter()
        .enumerate()
        .map(|(i, v)| format!("{}:{}", i + 1, v.title()))
        .collect();
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(" jobpilot "))
        .select(state.view().index())
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, chunks[0]);

    match state.view() {
        View::Dashboard => draw_dashboard(frame, state, chunks[1]),
        View::Jobs | View::Offers => draw_jobs(frame, state, browser, chunks[1]),
        View::Settings => draw_settings(frame, state, browser, chunks[1]),
    }

    let footer = match &browser.message {
        Some(message) => message.clone(),
        None => " tab/1-4:view  j/k:navigate  J/K:scroll  a:applied i:interview o:offer x:reject c:accepted  q:quit"
            .to_string(),
    };
    frame.render_widget(
        Paragraph::new(footer).style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );
}

fn draw_dashboard<S: KeyValueStore>(frame: &mut Frame, state: &AppState<S>, area: Rect) {
    let jobs = state.list_jobs();
    let totals = dashboard::totals(jobs);
    let activity = dashboard::current_month_activity(jobs);

    let mut lines = vec![
        Line::from(vec![
            Span::raw(format!("Applied {}   ", totals.applied)),
            Span::styled(format!("Interviews {}   ", totals.interviews), Style::default().fg(Color::Yellow)),
            Span::styled(format!("Offers {}   ", totals.offers), Style::default().fg(Color::Green)),
            Span::styled(format!("Rejected {}", totals.rejected), Style::default().fg(Color::Red)),
        ]),
        Line::from(""),
    ];

    let month = NaiveDate::from_ymd_opt(activity.year, activity.month, 1)
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_default();
    lines.push(Line::from(Span::styled(month, Style::default().add_modifier(Modifier::BOLD))));
    lines.extend(activity.render().lines().map(|l| Line::from(l.to_string())));
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        "Recent Activity",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    let recent = dashboard::recent(jobs);
    if recent.is_empty() {
        lines.push(Line::from(Span::styled("(nothing yet)", Style::default().fg(Color::DarkGray))));
    }
    for job in recent {
        lines.push(Line::from(vec![
            Span::raw(format!(
                "  {}  {} at {}  ",
                job.date_applied.with_timezone(&Local).format("%b %d"),
                job.role,
                job.company
            )),
            Span::styled(job.status.to_string(), status_style(job.status)),
        ]));
    }

    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Dashboard "));
    frame.render_widget(widget, area);
}

fn draw_jobs<S: KeyValueStore>(frame: &mut Frame, state: &AppState<S>, browser: &Browser, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    let jobs = visible_jobs(state);
    let items: Vec<ListItem> = jobs
        .iter()
        .map(|job| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", status_icon(job.status)), status_style(job.status)),
                Span::raw(format!("{} | {}", job.role, job.company)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ({}) ", state.view().title(), jobs.len())),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut list_state = ListState::default();
    if !jobs.is_empty() {
        list_state.select(Some(browser.selected));
    }
    frame.render_stateful_widget(list, chunks[0], &mut list_state);

    let detail = Paragraph::new(build_detail(jobs.get(browser.selected).copied()))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((browser.scroll_offset, 0));
    frame.render_widget(detail, chunks[1]);
}

fn draw_settings<S: KeyValueStore>(frame: &mut Frame, state: &AppState<S>, browser: &Browser, area: Rect) {
    let resume = state.resume();
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().fg(Color::DarkGray);

    let mut lines = vec![
        Line::from(Span::styled("Resume Profile", bold)),
        Line::from(format!("Name: {}", blank_as_dash(&resume.full_name))),
        Line::from(""),
        Line::from(Span::styled("Skills", bold)),
    ];
    lines.extend(
        textwrap::fill(blank_as_dash(&resume.skills), DETAIL_WIDTH)
            .lines()
            .map(|l| Line::from(l.to_string())),
    );
    lines.push(Line::from(""));
    match resume.resume_text.as_deref() {
        Some(text) if resume.has_full_text() => {
            lines.push(Line::from(Span::styled(
                format!("Full Resume ({} chars)", text.chars().count()),
                bold,
            )));
            lines.extend(text.lines().map(|l| Line::from(l.to_string())));
        }
        _ => lines.push(Line::from(Span::styled(
            "(No full resume; run: jobpilot resume import <file.pdf>)",
            dim,
        ))),
    }

    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Settings "))
        .wrap(Wrap { trim: false })
        .scroll((browser.scroll_offset, 0));
    frame.render_widget(widget, area);
}

fn build_detail(job: Option<&Job>) -> Text<'_> {
    let Some(job) = job else {
        return Text::raw("No job selected");
    };
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().fg(Color::DarkGray);

    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(job.role.as_str(), bold)),
        Line::from(format!("at {}", job.company)),
        Line::from(Span::styled(format!("Status: {}", job.status), status_style(job.status))),
    ];
    if job.origin == Origin::Offer {
        lines.push(Line::from(Span::styled("Offer received", dim)));
    }
    if !job.salary.is_empty() {
        lines.push(Line::from(format!("Salary: {}", job.salary)));
    }
    if !job.location.is_empty() {
        lines.push(Line::from(format!("Location: {}", job.location)));
    }
    lines.push(Line::from(format!(
        "Applied: {}",
        job.date_applied.with_timezone(&Local).format("%Y-%m-%d")
    )));
    lines.push(Line::from(""));

    if !job.description.is_empty() {
        lines.push(Line::from(Span::styled("Description", bold)));
        for line in textwrap::fill(&job.description, DETAIL_WIDTH).lines() {
            lines.push(Line::from(line.to_string()));
        }
        lines.push(Line::from(""));
    }

    match &job.enhanced_resume {
        Some(enhanced) => {
            lines.push(Line::from(Span::styled("Tailored Resume", bold)));
            for line in enhanced.render(DETAIL_WIDTH).lines() {
                lines.push(Line::from(line.to_string()));
            }
            lines.push(Line::from(""));
        }
        None => lines.push(Line::from(Span::styled(
            format!("(No tailored resume; run: jobpilot enhance {})", job.short_id()),
            dim,
        ))),
    }

    if job.cover_letter.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("(No cover letter; run: jobpilot letter {})", job.short_id()),
            dim,
        )));
    } else {
        lines.push(Line::from(Span::styled("Cover Letter", bold)));
        for line in job.cover_letter.lines() {
            lines.push(Line::from(line.to_string()));
        }
    }

    Text::from(lines)
}

fn status_icon(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Applied => " ",
        JobStatus::Interview => "*",
        JobStatus::Offer => "$",
        JobStatus::Rejected => "x",
        JobStatus::Accepted => "+",
        JobStatus::AutoPilot => "~",
    }
}

fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Applied => Style::default().fg(Color::Cyan),
        JobStatus::Interview => Style::default().fg(Color::Yellow),
        JobStatus::Offer | JobStatus::Accepted => Style::default().fg(Color::Green),
        JobStatus::Rejected => Style::default().fg(Color::Red),
        JobStatus::AutoPilot => Style::default().fg(Color::Magenta),
    }
}

fn blank_as_dash(s: &str) -> &str {
    if s.trim().is_empty() { "-" } else { s }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use ratatui::backend::TestBackend;

    fn state_with_jobs() -> AppState<MemoryStore> {
        let mut state = AppState::load(MemoryStore::new());
        state.add_job(Job::new("Acme", "Engineer")).unwrap();
        let mut offer = Job::new("Globex", "Analyst");
        offer.status = JobStatus::Offer;
        state.add_job(offer).unwrap();
        state.set_view(View::Jobs);
        state
    }

    fn screen_text(state: &AppState<MemoryStore>, browser: &Browser) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|frame| draw(frame, state, browser)).unwrap();
        terminal.backend().buffer().content.iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn test_tab_cycles_views_and_resets_cursor() {
        let mut state = state_with_jobs();
        let mut browser = Browser::default();
        handle_key(&mut state, &mut browser, KeyCode::Char('j'));
        assert_eq!(browser.selected, 1);

        handle_key(&mut state, &mut browser, KeyCode::Tab);
        assert_eq!(state.view(), View::Offers);
        assert_eq!(browser.selected, 0);

        handle_key(&mut state, &mut browser, KeyCode::Char('1'));
        assert_eq!(state.view(), View::Dashboard);
    }

    #[test]
    fn test_navigation_stops_at_ends() {
        let mut state = state_with_jobs();
        let mut browser = Browser::default();
        handle_key(&mut state, &mut browser, KeyCode::Char('k'));
        assert_eq!(browser.selected, 0);
        for _ in 0..5 {
            handle_key(&mut state, &mut browser, KeyCode::Down);
        }
        assert_eq!(browser.selected, 1);
    }

    #[test]
    fn test_status_key_persists_change() {
        let mut state = state_with_jobs();
        let mut browser = Browser::default();
        // Newest first: Globex is at the top.
        handle_key(&mut state, &mut browser, KeyCode::Char('i'));
        assert_eq!(state.list_jobs()[0].status, JobStatus::Interview);

        let reloaded = AppState::load(state.store().backend().clone());
        assert_eq!(reloaded.list_jobs()[0].status, JobStatus::Interview);
    }

    #[test]
    fn test_status_change_out_of_offers_clamps_cursor() {
        let mut state = state_with_jobs();
        state.set_view(View::Offers);
        let mut browser = Browser::default();
        handle_key(&mut state, &mut browser, KeyCode::Char('x'));
        assert!(visible_jobs(&state).is_empty());
        assert_eq!(browser.selected, 0);
        assert!(selected_job(&state, &browser).is_none());
    }

    #[test]
    fn test_status_keys_ignored_outside_job_lists() {
        let mut state = state_with_jobs();
        state.set_view(View::Dashboard);
        let mut browser = Browser::default();
        handle_key(&mut state, &mut browser, KeyCode::Char('x'));
        assert!(state.list_jobs().iter().all(|j| j.status != JobStatus::Rejected));
    }

    #[test]
    fn test_empty_store_still_browses() {
        let mut state = AppState::load(MemoryStore::new());
        assert_eq!(initial_view(&state), View::Dashboard);
        assert_eq!(initial_view(&state_with_jobs()), View::Jobs);

        let mut browser = Browser::default();
        handle_key(&mut state, &mut browser, KeyCode::Char('2'));
        handle_key(&mut state, &mut browser, KeyCode::Char('j'));
        handle_key(&mut state, &mut browser, KeyCode::Char('x'));
        assert_eq!(browser.selected, 0);
        let screen = screen_text(&state, &browser);
        assert!(screen.contains("My Applications (0)"));
        assert!(screen.contains("No job selected"));

        state.set_view(View::Settings);
        assert!(screen_text(&state, &browser).contains("Resume Profile"));
    }

    #[test]
    fn test_quit() {
        let mut state = state_with_jobs();
        let mut browser = Browser::default();
        assert!(handle_key(&mut state, &mut browser, KeyCode::Char('q')));
        assert!(!handle_key(&mut state, &mut browser, KeyCode::Char('z')));
    }

    #[test]
    fn test_draw_each_view() {
        let mut state = state_with_jobs();
        let browser = Browser::default();

        let screen = screen_text(&state, &browser);
        assert!(screen.contains("My Applications (2)"));
        assert!(screen.contains("Globex"));

        state.set_view(View::Offers);
        assert!(screen_text(&state, &browser).contains("Offers Received (1)"));

        state.set_view(View::Dashboard);
        assert!(screen_text(&state, &browser).contains("Recent Activity"));

        state.set_view(View::Settings);
        assert!(screen_text(&state, &browser).contains("Resume Profile"));
    }
}
