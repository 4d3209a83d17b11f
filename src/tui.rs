use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Timelike, Utc};
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Clear, Gauge, Paragraph, Wrap};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::api::BiddingApi;
use crate::command::Command;
use crate::config::ConfiguredTimeZone;
use crate::format::{
    ChangeTone, clock_line, format_amount, format_amount_yi, format_hms, format_percent,
};
use crate::history::{HistoryDataset, HistoryError, HistoryQuery, HistoryStatus};
use crate::playback::{Playback, PlaybackChange, PlaybackTimer};
use crate::ranking::{AnimatedBar, BarTone, RankMove, RankTransition, rank_top};
use crate::realtime::RealtimeWindow;
use crate::row::Row;
use crate::session::{SessionStore, verify_password};

const TITLE: &str = "竞价数据封单数据查看与回放";
const LOADING_SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const BAR_EIGHTHS: [&str; 8] = ["", "▏", "▎", "▍", "▌", "▋", "▊", "▉"];
const PAGE_STEP: isize = 10;
const BAR_FIXED_WIDTH: usize = 61;
const NAME_WIDTH: usize = 8;

const TABLE_COLUMNS: [(&str, ColumnAlign, usize); 15] = [
    ("代码/名称", ColumnAlign::Left, 18),
    ("现价", ColumnAlign::Right, 8),
    ("涨幅", ColumnAlign::Right, 8),
    ("涨停封单额", ColumnAlign::Right, 11),
    ("开盘涨幅", ColumnAlign::Right, 8),
    ("竞价价", ColumnAlign::Right, 8),
    ("竞价换手", ColumnAlign::Right, 8),
    ("竞价成交额", ColumnAlign::Right, 11),
    ("竞价净额", ColumnAlign::Right, 11),
    ("开盘金额", ColumnAlign::Right, 11),
    ("板块", ColumnAlign::Left, 12),
    ("主力净", ColumnAlign::Right, 11),
    ("主力买", ColumnAlign::Right, 11),
    ("主力卖", ColumnAlign::Right, 11),
    ("连板说明", ColumnAlign::Left, 10),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColumnAlign {
    Left,
    Right,
}

struct LoadingSpinner {
    spinner_index: usize,
    last_tick: Instant,
}

impl LoadingSpinner {
    fn new() -> Self {
        LoadingSpinner {
            spinner_index: 0,
            last_tick: Instant::now(),
        }
    }

    fn tick(&mut self) -> bool {
        let interval = Duration::from_millis(120);
        if self.last_tick.elapsed() < interval {
            return false;
        }
        self.spinner_index = (self.spinner_index + 1) % LOADING_SPINNER_FRAMES.len();
        self.last_tick = Instant::now();
        true
    }

    fn spinner(&self) -> char {
        LOADING_SPINNER_FRAMES[self.spinner_index % LOADING_SPINNER_FRAMES.len()]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Screen {
    Login,
    Dashboard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HistoryView {
    Chart,
    Table,
}

#[derive(Clone, Debug, Default)]
struct LoginState {
    input: String,
    error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueryField {
    Date,
    Start,
    End,
}

#[derive(Clone, Debug)]
struct QueryInputState {
    date: String,
    start: String,
    end: String,
    active_field: QueryField,
    error: Option<String>,
}

impl QueryInputState {
    fn from_query(query: &HistoryQuery) -> Self {
        QueryInputState {
            date: query.date.format("%Y-%m-%d").to_string(),
            start: query.start.format("%H:%M:%S").to_string(),
            end: query.end.format("%H:%M:%S").to_string(),
            active_field: QueryField::Date,
            error: None,
        }
    }

    fn active_value_mut(&mut self) -> &mut String {
        match self.active_field {
            QueryField::Date => &mut self.date,
            QueryField::Start => &mut self.start,
            QueryField::End => &mut self.end,
        }
    }

    fn focus_next_field(&mut self) {
        self.active_field = match self.active_field {
            QueryField::Date => QueryField::Start,
            QueryField::Start => QueryField::End,
            QueryField::End => QueryField::Date,
        };
    }

    fn focus_prev_field(&mut self) {
        self.active_field = match self.active_field {
            QueryField::Date => QueryField::End,
            QueryField::Start => QueryField::Date,
            QueryField::End => QueryField::Start,
        };
    }

    fn parse(&self) -> std::result::Result<HistoryQuery, String> {
        HistoryQuery::parse(&self.date, &self.start, &self.end)
    }
}

/// Startup settings of the dashboard.
#[derive(Clone, Debug)]
pub struct AppSettings {
    pub timezone: ConfiguredTimeZone,
    pub initial_query: HistoryQuery,
    pub realtime_window: RealtimeWindow,
    pub playback_interval: Duration,
    pub top_n: usize,
}

pub struct TuiApp {
    api: BiddingApi,
    tx: broadcast::Sender<Command>,
    session: SessionStore,
    settings: AppSettings,
    screen: Screen,
    login: LoginState,
    password_hash: Option<String>,
    realtime_rows: Vec<Row>,
    realtime_active: bool,
    realtime_generation: u64,
    realtime_bars: RankTransition,
    history: Arc<HistoryDataset>,
    history_status: HistoryStatus,
    history_bars: RankTransition,
    history_view: HistoryView,
    playback: Playback,
    playback_timer: PlaybackTimer,
    query: HistoryQuery,
    query_input: Option<QueryInputState>,
    query_generation: u64,
    query_task: Option<JoinHandle<()>>,
    table_scroll: usize,
    /// Table body rows that fit on screen, recorded by the last draw.
    table_page: Cell<usize>,
    loading: Option<LoadingSpinner>,
    last_draw: Instant,
    min_redraw_gap: Duration,
    last_clock_second: Option<u32>,
    status_message: Option<String>,
    status_visible_until: Option<Instant>,
    status_is_error: bool,
    exit_confirmation: bool,
}

impl TuiApp {
    fn is_exit_key(key: &KeyEvent) -> bool {
        matches!(
            key.code,
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc
        ) || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
    }

    pub fn new(
        api: BiddingApi,
        tx: broadcast::Sender<Command>,
        session: SessionStore,
        settings: AppSettings,
    ) -> TuiApp {
        let min_redraw_gap = Duration::from_millis(100);
        let screen = if session.is_valid(Utc::now().timestamp_millis()) {
            tracing::info!("restored login session");
            Screen::Dashboard
        } else {
            Screen::Login
        };
        let query = settings.initial_query;
        TuiApp {
            api,
            tx,
            session,
            settings,
            screen,
            login: LoginState::default(),
            password_hash: None,
            realtime_rows: Vec::new(),
            realtime_active: false,
            realtime_generation: 0,
            realtime_bars: RankTransition::new(),
            history: Arc::new(HistoryDataset::default()),
            history_status: HistoryStatus::Idle,
            history_bars: RankTransition::new(),
            history_view: HistoryView::Chart,
            playback: Playback::new(),
            playback_timer: PlaybackTimer::new(),
            query,
            query_input: None,
            query_generation: 0,
            query_task: None,
            table_scroll: 0,
            table_page: Cell::new(0),
            loading: None,
            last_draw: Instant::now() - min_redraw_gap,
            min_redraw_gap,
            last_clock_second: None,
            status_message: None,
            status_visible_until: None,
            status_is_error: false,
            exit_confirmation: false,
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_visible_until = Some(Instant::now() + Duration::from_secs(3));
        self.status_is_error = false;
    }

    fn set_error_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_visible_until = Some(Instant::now() + Duration::from_secs(5));
        self.status_is_error = true;
    }

    fn clear_status_if_allowed(&mut self) -> bool {
        if self.status_message.is_none() {
            return false;
        }
        if let Some(visible_until) = self.status_visible_until {
            if Instant::now() < visible_until {
                return false;
            }
        }
        self.status_message = None;
        self.status_visible_until = None;
        self.status_is_error = false;
        true
    }

    pub fn dispose(&mut self) {
        self.playback_timer.stop();
        if let Some(task) = self.query_task.take() {
            task.abort();
        }
        ratatui::restore();
    }

    pub async fn run(&mut self, rx: &mut broadcast::Receiver<Command>) -> Result<()> {
        color_eyre::install()?;
        let mut terminal = ratatui::init();
        let mut input_tick = tokio::time::interval(self.min_redraw_gap);
        self.fetch_data(self.query);
        terminal.draw(|frame| self.render(frame))?;
        self.last_draw = Instant::now();
        loop {
            tokio::select! {
                biased;
                _ = input_tick.tick() => {
                    if self.poll_input()? {
                        return Ok(());
                    }
                    let mut should_redraw = self.tick_animations();
                    if self.clear_status_if_allowed() {
                        should_redraw = true;
                    }
                    let second = self.settings.timezone.time_of_day().second();
                    if self.last_clock_second != Some(second) {
                        self.last_clock_second = Some(second);
                        should_redraw = true;
                    }
                    if should_redraw && self.last_draw.elapsed() >= self.min_redraw_gap {
                        terminal.draw(|frame| self.render(frame))?;
                        self.last_draw = Instant::now();
                    }
                }
                result = rx.recv() => {
                    match result {
                        Ok(command) => {
                            if self.handle_command(command) {
                                return Ok(());
                            }
                            if self.last_draw.elapsed() >= self.min_redraw_gap {
                                terminal.draw(|frame| self.render(frame))?;
                                self.last_draw = Instant::now();
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "ui lagged behind command channel");
                            continue;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies one background message. Returns `true` when the UI should exit.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::PasswordHash(hash) => {
                if hash.is_none() && self.screen == Screen::Login {
                    self.set_error_status_message("获取密码信息失败");
                }
                self.password_hash = hash;
            }
            Command::RealtimeRows(generation, rows) => {
                if generation != self.realtime_generation {
                    tracing::debug!(
                        generation,
                        current = self.realtime_generation,
                        "dropping rows from a stopped poller"
                    );
                    return false;
                }
                self.realtime_rows = rows;
                self.refresh_realtime_bars();
            }
            Command::RealtimeActive(generation, active) => {
                self.realtime_generation = generation;
                self.realtime_active = active;
            }
            Command::HistoryLoaded(generation, result) => {
                if generation != self.query_generation {
                    tracing::debug!(generation, current = self.query_generation, "dropping superseded history response");
                    return false;
                }
                self.query_task = None;
                self.apply_history(result);
            }
            Command::PlaybackTick(generation) => self.on_playback_tick(generation),
            Command::Error(message) => {
                tracing::error!(%message, "background task failed");
                self.set_error_status_message(message);
            }
            Command::Exit => return true,
        }
        false
    }

    /// Starts a history query. Running playback stops first and any earlier
    /// query still in flight is superseded.
    fn fetch_data(&mut self, query: HistoryQuery) {
        self.stop_playback();
        if let Some(task) = self.query_task.take() {
            task.abort();
        }
        self.query_generation += 1;
        self.query = query;
        self.history_status = HistoryStatus::Loading;
        self.loading = Some(LoadingSpinner::new());
        let generation = self.query_generation;
        let api = self.api.clone();
        let tx = self.tx.clone();
        tracing::info!(query = %query.label(), generation, "requesting history");
        self.query_task = Some(tokio::spawn(async move {
            let result = api.fetch_history(&query).await.map(Arc::new);
            if let Err(HistoryError::Transport(detail)) = &result {
                tracing::warn!(%detail, "history request failed");
            }
            let _ = tx.send(Command::HistoryLoaded(generation, result));
        }));
    }

    fn apply_history(&mut self, result: std::result::Result<Arc<HistoryDataset>, HistoryError>) {
        self.loading = None;
        self.table_scroll = 0;
        match result {
            Ok(dataset) => {
                self.history_status = if dataset.is_empty() {
                    HistoryStatus::Empty
                } else {
                    HistoryStatus::Ready
                };
                tracing::info!(snapshots = dataset.len(), "history loaded");
                self.playback.reset(dataset.len());
                self.history = dataset;
            }
            Err(err) => {
                tracing::info!(error = %err, "history query failed");
                self.playback.reset(0);
                self.history = Arc::new(HistoryDataset::default());
                self.history_status = HistoryStatus::Failed(err);
            }
        }
        self.refresh_history_bars();
    }

    fn toggle_playback(&mut self) {
        match self.playback.toggle() {
            PlaybackChange::Started => {
                self.playback_timer
                    .start(self.settings.playback_interval, self.tx.clone());
            }
            PlaybackChange::Paused => self.playback_timer.stop(),
            PlaybackChange::Ignored => self.set_status_message("暂无可回放的数据"),
        }
    }

    fn stop_playback(&mut self) {
        self.playback.stop();
        self.playback_timer.stop();
    }

    fn on_playback_tick(&mut self, generation: u64) {
        if !self.playback_timer.accepts(generation) {
            return;
        }
        if !self.playback.advance() {
            self.playback_timer.stop();
        }
        self.refresh_history_bars();
    }

    /// Slider movement: positions the cursor and pauses.
    fn seek(&mut self, index: usize) {
        self.playback_timer.stop();
        self.playback.seek(index);
        self.refresh_history_bars();
    }

    fn step(&mut self, delta: isize) {
        self.playback_timer.stop();
        self.playback.step(delta);
        self.refresh_history_bars();
    }

    /// Last scroll offset that still fills the table body.
    fn table_max_scroll(&self) -> usize {
        self.current_rows()
            .len()
            .saturating_sub(self.table_page.get().max(1))
    }

    fn current_rows(&self) -> &[Row] {
        self.history.rows_at(self.playback.index())
    }

    fn current_time_label(&self) -> String {
        self.history
            .label_at(self.playback.index())
            .unwrap_or_else(|| "-".to_string())
    }

    fn refresh_realtime_bars(&mut self) {
        let ranked = rank_top(&self.realtime_rows, self.settings.top_n);
        self.realtime_bars.update(ranked);
    }

    fn refresh_history_bars(&mut self) {
        let ranked = rank_top(self.current_rows(), self.settings.top_n);
        self.history_bars.update(ranked);
    }

    fn tick_animations(&mut self) -> bool {
        let realtime = self.realtime_bars.tick();
        let history = self.history_bars.tick();
        let spinner = self
            .loading
            .as_mut()
            .map(|spinner| spinner.tick())
            .unwrap_or(false);
        realtime || history || spinner
    }

    fn try_login(&mut self, now_ms: i64) {
        match verify_password(&self.login.input, self.password_hash.as_deref()) {
            Ok(()) => {
                self.login = LoginState::default();
                self.screen = Screen::Dashboard;
                tracing::info!("login accepted");
                if let Err(err) = self.session.persist(now_ms) {
                    tracing::warn!(error = %format!("{err:#}"), "cannot persist login session");
                    self.set_error_status_message(format!("保存登录状态失败: {err}"));
                }
            }
            Err(err) => {
                self.login.input.clear();
                self.login.error = Some(err.message().to_string());
            }
        }
    }

    fn poll_input(&mut self) -> Result<bool> {
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if self.handle_key_event(key) {
                        return Ok(true);
                    }
                }
                Event::Resize(_, _) => {
                    self.last_clock_second = None;
                }
                _ => {}
            }
        }
        Ok(false)
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> bool {
        if self.exit_confirmation {
            return self.handle_exit_confirmation_key(key);
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.prompt_exit_confirmation();
            return false;
        }
        match self.screen {
            Screen::Login => self.handle_login_key(key),
            Screen::Dashboard if self.query_input.is_some() => self.handle_query_input_key(key),
            Screen::Dashboard => self.handle_dashboard_key(key),
        }
        false
    }

    fn prompt_exit_confirmation(&mut self) {
        if self.exit_confirmation {
            return;
        }
        self.exit_confirmation = true;
        self.set_status_message("确认退出？Y/Enter 确认 · N/Esc 取消");
    }

    fn handle_exit_confirmation_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.exit_confirmation = false;
            return true;
        }
        match key.code {
            KeyCode::Char('y')
            | KeyCode::Char('Y')
            | KeyCode::Char('q')
            | KeyCode::Char('Q')
            | KeyCode::Enter => {
                self.exit_confirmation = false;
                true
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.exit_confirmation = false;
                self.set_status_message("已取消退出");
                false
            }
            _ => false,
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.prompt_exit_confirmation(),
            KeyCode::Enter => self.try_login(Utc::now().timestamp_millis()),
            KeyCode::Backspace => {
                self.login.input.pop();
            }
            KeyCode::Char(c) if !c.is_control() => {
                self.login.input.push(c);
                self.login.error = None;
            }
            _ => {}
        }
    }

    fn handle_dashboard_key(&mut self, key: KeyEvent) {
        if Self::is_exit_key(&key) {
            self.prompt_exit_confirmation();
            return;
        }
        match key.code {
            KeyCode::Char(' ') | KeyCode::Char('p') | KeyCode::Char('P') => self.toggle_playback(),
            KeyCode::Left => self.step(-1),
            KeyCode::Right => self.step(1),
            KeyCode::PageUp => self.step(-PAGE_STEP),
            KeyCode::PageDown => self.step(PAGE_STEP),
            KeyCode::Home => self.seek(0),
            KeyCode::End => self.seek(self.playback.last_index()),
            KeyCode::Char('/') | KeyCode::Char('f') | KeyCode::Char('F') => {
                self.query_input = Some(QueryInputState::from_query(&self.query));
            }
            KeyCode::Char('r') | KeyCode::Char('R') => self.fetch_data(self.query),
            KeyCode::Char('v') | KeyCode::Char('V') => {
                self.history_view = match self.history_view {
                    HistoryView::Chart => {
                        self.set_status_message("表格视图 (V)");
                        HistoryView::Table
                    }
                    HistoryView::Table => {
                        self.set_status_message("图表视图 (V)");
                        HistoryView::Chart
                    }
                };
            }
            KeyCode::Up if self.history_view == HistoryView::Table => {
                self.table_scroll = self
                    .table_scroll
                    .min(self.table_max_scroll())
                    .saturating_sub(1);
            }
            KeyCode::Down if self.history_view == HistoryView::Table => {
                self.table_scroll = (self.table_scroll + 1).min(self.table_max_scroll());
            }
            _ => {}
        }
    }

    fn handle_query_input_key(&mut self, key: KeyEvent) {
        let Some(input) = self.query_input.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.query_input = None;
                self.set_status_message("已取消查询");
            }
            KeyCode::Enter => match input.parse() {
                Ok(query) => {
                    self.query_input = None;
                    self.fetch_data(query);
                }
                Err(err) => input.error = Some(err),
            },
            KeyCode::Tab | KeyCode::Right => input.focus_next_field(),
            KeyCode::BackTab | KeyCode::Left => input.focus_prev_field(),
            KeyCode::Backspace => {
                input.active_value_mut().pop();
            }
            KeyCode::Char(c) if c.is_ascii_digit() || c == '-' || c == ':' => {
                input.active_value_mut().push(c);
                input.error = None;
            }
            _ => {}
        }
    }

    fn render(&self, frame: &mut Frame) {
        match self.screen {
            Screen::Login => self.render_login(frame),
            Screen::Dashboard => self.render_dashboard(frame),
        }
        if let Some(input) = &self.query_input {
            self.render_query_dialog(frame, input);
        }
        if self.exit_confirmation {
            self.render_exit_confirmation(frame);
        }
    }

    fn render_login(&self, frame: &mut Frame) {
        let area = frame.area();
        let popup_width = area.width.saturating_sub(10).min(44).max(24);
        let popup_height = 7;
        let left = area.x + (area.width.saturating_sub(popup_width)) / 2;
        let top = area.y + (area.height.saturating_sub(popup_height)) / 2;
        let popup = Rect::new(
            left,
            top,
            popup_width.min(area.width),
            popup_height.min(area.height),
        );
        let masked = "*".repeat(self.login.input.chars().count());
        let mut lines = vec![
            Line::from(vec![
                Span::raw("密码 "),
                Span::styled(
                    if masked.is_empty() {
                        "<请输入密码>".to_string()
                    } else {
                        masked
                    },
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(if self.password_hash.is_some() {
                "Enter 登录 · Esc 退出"
            } else {
                "初始化中... · Esc 退出"
            }),
        ];
        if let Some(err) = &self.login.error {
            lines.push(Line::from(Span::styled(
                err.as_str(),
                Style::default().fg(Color::LightRed),
            )));
        }
        if let Some(message) = &self.status_message {
            lines.push(Line::from(Span::styled(
                message.as_str(),
                Style::default().fg(if self.status_is_error {
                    Color::Red
                } else {
                    Color::Yellow
                }),
            )));
        }
        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Left)
            .wrap(Wrap { trim: true })
            .block(Block::bordered().title(TITLE));
        frame.render_widget(Clear, popup);
        frame.render_widget(paragraph, popup);
    }

    fn render_dashboard(&self, frame: &mut Frame) {
        let area = frame.area();
        let has_status = self.status_message.is_some() && area.height >= 16;
        let mut constraints = vec![
            Constraint::Length(3),
            Constraint::Percentage(40),
            Constraint::Min(8),
            Constraint::Length(4),
            Constraint::Length(1),
        ];
        if has_status {
            constraints.push(Constraint::Length(3));
        }
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);
        self.render_header(frame, chunks[0]);
        self.render_realtime_panel(frame, chunks[1]);
        self.render_history_panel(frame, chunks[2]);
        self.render_slider(frame, chunks[3]);
        self.render_help(frame, chunks[4]);
        if has_status {
            self.render_status(frame, chunks[5]);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let clock = clock_line(&self.settings.timezone.now());
        let realtime_badge = if self.realtime_active {
            Span::styled(
                " 实时 ● 进行中 ",
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::LightRed)
                    .add_modifier(Modifier::BOLD),
            )
        } else {
            Span::styled(
                format!(" 实时 ○ 非竞价时段 {} ", self.settings.realtime_window.label()),
                Style::default().fg(Color::Gray),
            )
        };
        let line = Line::from(vec![
            Span::styled(
                clock,
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            realtime_badge,
        ]);
        let paragraph = Paragraph::new(line)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(Span::styled(
                TITLE,
                Style::default().add_modifier(Modifier::BOLD),
            )));
        frame.render_widget(paragraph, area);
    }

    fn render_realtime_panel(&self, frame: &mut Frame, area: Rect) {
        let block = Block::bordered().title(format!(
            "实时竞价 Top{} ({} 只)",
            self.settings.top_n,
            self.realtime_rows.len()
        ));
        if self.realtime_bars.is_empty() {
            let paragraph = Paragraph::new("暂无实时竞价数据")
                .style(Style::default().fg(Color::DarkGray))
                .alignment(Alignment::Center)
                .block(block);
            frame.render_widget(paragraph, area);
            return;
        }
        let inner_width = area.width.saturating_sub(2) as usize;
        let visible = area.height.saturating_sub(2) as usize;
        let lines = bar_lines(
            self.realtime_bars.bars(),
            self.realtime_bars.max_target(),
            inner_width,
            visible,
        );
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_history_panel(&self, frame: &mut Frame, area: Rect) {
        let play_badge = if self.playback.is_playing() {
            Span::styled(" ▶ 播放中 ", Style::default().fg(Color::LightRed))
        } else {
            Span::styled(" ⏸ 已暂停 ", Style::default().fg(Color::Gray))
        };
        let title = Line::from(vec![
            Span::styled(
                format!("历史回放 {}", self.query.label()),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            play_badge,
        ]);
        let block = Block::bordered().title(title);
        if let Some(message) = self.history_status.message() {
            let (text, color) = match (&self.history_status, &self.loading) {
                (HistoryStatus::Loading, Some(spinner)) => {
                    (format!("{} {message}", spinner.spinner()), Color::Yellow)
                }
                _ if self.history_status.is_error() => (message, Color::LightRed),
                _ => (message, Color::Yellow),
            };
            let paragraph = Paragraph::new(Line::from(Span::styled(
                text,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(block);
            frame.render_widget(paragraph, area);
            return;
        }
        let inner_width = area.width.saturating_sub(2) as usize;
        let visible = area.height.saturating_sub(2) as usize;
        let lines = match self.history_view {
            HistoryView::Chart if self.history_bars.is_empty() => {
                vec![Line::from(Span::styled(
                    "该时刻暂无数据",
                    Style::default().fg(Color::DarkGray),
                ))]
            }
            HistoryView::Chart => bar_lines(
                self.history_bars.bars(),
                self.history_bars.max_target(),
                inner_width,
                visible,
            ),
            HistoryView::Table => {
                self.table_page.set(visible.saturating_sub(1));
                table_lines(self.current_rows(), self.table_scroll, visible)
            }
        };
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_slider(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Length(1)])
            .split(area);
        let len = self.playback.len();
        let index = self.playback.index();
        let ratio = if len > 1 {
            index as f64 / self.playback.last_index() as f64
        } else if len == 1 {
            1.0
        } else {
            0.0
        };
        let gauge = Gauge::default()
            .block(Block::bordered().title("时间轴"))
            .gauge_style(Style::default().fg(Color::LightBlue).bg(Color::Black))
            .ratio(ratio.clamp(0.0, 1.0))
            .label(format!("当前时间：{}", self.current_time_label()));
        frame.render_widget(gauge, chunks[0]);

        let first = self.history.label_at(0).unwrap_or_else(|| "-".to_string());
        let last = self
            .history
            .label_at(self.playback.last_index())
            .unwrap_or_else(|| "-".to_string());
        let remaining_steps = self.playback.last_index().saturating_sub(index) as u64;
        let remaining_secs =
            (self.settings.playback_interval.as_millis() as u64 * remaining_steps).div_ceil(1000);
        let position = if len == 0 {
            "0/0".to_string()
        } else {
            format!("{}/{}", index + 1, len)
        };
        let line = Line::from(vec![
            Span::styled(first, Style::default().fg(Color::Gray)),
            Span::raw(format!("  ◀ {position} ▶  ")),
            Span::styled(last, Style::default().fg(Color::Gray)),
            Span::raw(format!("  剩余 {}", format_hms(remaining_secs))),
        ]);
        frame.render_widget(
            Paragraph::new(line).alignment(Alignment::Center),
            chunks[1],
        );
    }

    fn render_help(&self, frame: &mut Frame, area: Rect) {
        let help = "Space 播放/暂停 · ←/→ 单步 · PgUp/PgDn ±10 · Home/End · / 查询 · R 重新查询 · V 图表/表格 · Q 退出";
        frame.render_widget(
            Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
            area,
        );
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        if let Some(message) = &self.status_message {
            let color = if self.status_is_error {
                Color::Red
            } else {
                Color::Yellow
            };
            let status = Paragraph::new(message.as_str())
                .style(Style::default().fg(color))
                .alignment(Alignment::Left)
                .block(Block::bordered().title("Status"));
            frame.render_widget(status, area);
        }
    }

    fn render_query_dialog(&self, frame: &mut Frame, input: &QueryInputState) {
        let area = frame.area();
        if area.width < 20 || area.height < 6 {
            return;
        }
        let popup_width = area.width.saturating_sub(10).min(50).max(30);
        let popup_height = area.height.min(8).max(6);
        let left = area.x + (area.width.saturating_sub(popup_width)) / 2;
        let top = area.y + (area.height.saturating_sub(popup_height)) / 2;
        let popup = Rect::new(left, top, popup_width, popup_height);
        let mut lines = vec![
            query_field_span("日期", &input.date, input.active_field == QueryField::Date),
            query_field_span(
                "开始时间",
                &input.start,
                input.active_field == QueryField::Start,
            ),
            query_field_span("结束时间", &input.end, input.active_field == QueryField::End),
            Line::from("Enter 查询 · Esc 取消 · Tab/Shift+Tab 切换字段"),
        ];
        if let Some(err) = &input.error {
            lines.push(Line::from(Span::styled(
                err.as_str(),
                Style::default().fg(Color::LightRed),
            )));
        }
        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Left)
            .block(Block::bordered().title("历史查询"));
        frame.render_widget(Clear, popup);
        frame.render_widget(paragraph, popup);
    }

    fn render_exit_confirmation(&self, frame: &mut Frame) {
        let area = frame.area();
        if area.width < 24 || area.height < 5 {
            return;
        }
        let popup_width = area.width.saturating_sub(20).min(50).max(28);
        let popup_height = 5;
        let left = area.x + (area.width.saturating_sub(popup_width)) / 2;
        let top = area.y + (area.height.saturating_sub(popup_height)) / 2;
        let popup = Rect::new(left, top, popup_width, popup_height);
        let lines = vec![
            Line::from(Span::styled(
                "确定要退出？",
                Style::default()
                    .fg(Color::LightRed)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from("Y/Enter 确认退出 · N/Esc 取消"),
            Line::from("Ctrl+C 立即退出"),
        ];
        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Left)
            .block(Block::bordered().title("确认退出"));
        frame.render_widget(Clear, popup);
        frame.render_widget(paragraph, popup);
    }
}

impl Drop for TuiApp {
    fn drop(&mut self) {
        if let Some(task) = self.query_task.take() {
            task.abort();
        }
    }
}

fn query_field_span(label: &str, value: &str, active: bool) -> Line<'static> {
    let mut spans = vec![Span::raw(pad_to_width(label, 9, ColumnAlign::Left))];
    let mut style = Style::default().fg(Color::White);
    if active {
        style = style
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::REVERSED);
    }
    spans.push(Span::styled(
        if value.is_empty() {
            "<空>".to_string()
        } else {
            value.to_string()
        },
        style,
    ));
    Line::from(spans)
}

fn tone_color(tone: BarTone) -> Color {
    match tone {
        BarTone::Leader => Color::Yellow,
        BarTone::Up => Color::LightRed,
        BarTone::Down => Color::Green,
        BarTone::Flat => Color::LightBlue,
    }
}

fn change_color(tone: ChangeTone, neutral: Color) -> Color {
    match tone {
        ChangeTone::Up => Color::LightRed,
        ChangeTone::Down => Color::Green,
        ChangeTone::Flat => neutral,
    }
}

fn move_marker(movement: RankMove) -> Span<'static> {
    match movement {
        RankMove::New => Span::styled("+", Style::default().fg(Color::Cyan)),
        RankMove::Up(_) => Span::styled("▲", Style::default().fg(Color::LightRed)),
        RankMove::Down(_) => Span::styled("▼", Style::default().fg(Color::Green)),
        RankMove::Same => Span::raw(" "),
    }
}

/// Horizontal bar drawn with eighth-block glyphs, padded to `width` cells.
fn bar_glyphs(value: f64, max: f64, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    if max <= 0.0 || value <= 0.0 {
        return " ".repeat(width);
    }
    let cells = (value / max).clamp(0.0, 1.0) * width as f64;
    let full = cells.floor() as usize;
    let eighths = ((cells - full as f64) * 8.0).round() as usize;
    let mut bar = "█".repeat(full.min(width));
    if full < width {
        if eighths >= 8 {
            bar.push('█');
        } else if eighths > 0 {
            bar.push_str(BAR_EIGHTHS[eighths]);
        } else if full == 0 {
            bar.push_str(BAR_EIGHTHS[1]);
        }
    }
    pad_to_width(&bar, width, ColumnAlign::Left)
}

fn bar_lines(
    bars: &[AnimatedBar],
    max: f64,
    inner_width: usize,
    visible: usize,
) -> Vec<Line<'static>> {
    let bar_width = inner_width.saturating_sub(BAR_FIXED_WIDTH).max(4);
    bars.iter()
        .take(visible)
        .map(|animated| {
            let bar = &animated.bar;
            let change = ChangeTone::of(bar.auction_pct_change);
            let value_color = change_color(change, Color::LightBlue);
            let name_color = if change == ChangeTone::Down {
                Color::Green
            } else {
                Color::White
            };
            Line::from(vec![
                Span::styled(
                    format!("{:>2} ", bar.rank),
                    Style::default()
                        .fg(Color::LightBlue)
                        .add_modifier(Modifier::BOLD),
                ),
                move_marker(animated.movement),
                Span::raw(" "),
                Span::styled(
                    format_column_value(&bar.name, ColumnAlign::Left, NAME_WIDTH),
                    Style::default().fg(name_color).add_modifier(Modifier::BOLD),
                ),
                Span::raw(" "),
                Span::styled(
                    bar_glyphs(animated.shown, max, bar_width),
                    Style::default().fg(tone_color(bar.tone)),
                ),
                Span::raw(" "),
                Span::styled(
                    format_column_value(&format_amount_yi(bar.amount), ColumnAlign::Right, 9),
                    Style::default().fg(value_color),
                ),
                Span::raw(" "),
                Span::styled(
                    format_column_value(
                        &format_percent(bar.auction_pct_change),
                        ColumnAlign::Right,
                        7,
                    ),
                    Style::default().fg(value_color),
                ),
                Span::raw(" "),
                Span::raw(format_column_value(
                    &format_amount_yi(bar.open_amount),
                    ColumnAlign::Right,
                    9,
                )),
                Span::raw(" "),
                Span::raw(format_column_value(
                    &format_percent(bar.bid_turnover),
                    ColumnAlign::Right,
                    7,
                )),
                Span::raw(" "),
                Span::styled(
                    clip_to_width(bar.sector.as_deref().unwrap_or("-"), 10),
                    Style::default().fg(Color::Gray),
                ),
            ])
        })
        .collect()
}

fn table_cells(row: &Row) -> Vec<(String, Color)> {
    let neutral = Color::White;
    let row_tone = ChangeTone::of(row.pct_change);
    let by_row = change_color(row_tone, neutral);
    let code_name = format!(
        "{}/{}",
        row.code.as_deref().unwrap_or("-"),
        row.display_name()
    );
    vec![
        (code_name, Color::White),
        (format_price(row.last_price), neutral),
        (
            format_percent(row.pct_change),
            change_color(row_tone, neutral),
        ),
        (format_amount(row.seal_amount), by_row),
        (
            format_percent(row.auction_pct_change),
            change_color(ChangeTone::of(row.auction_pct_change), neutral),
        ),
        (format_price(row.auction_price), neutral),
        (format_percent(row.bid_turnover), neutral),
        (format_amount(row.auction_turnover), by_row),
        (format_amount(row.auction_net), by_row),
        (format_amount(row.open_amount), by_row),
        (row.sector.clone().unwrap_or_else(|| "-".to_string()), neutral),
        (format_amount(row.main_net), neutral),
        (format_amount(row.main_buy), neutral),
        (format_amount(row.main_sell), neutral),
        (
            row.limit_note.clone().unwrap_or_else(|| "-".to_string()),
            neutral,
        ),
    ]
}

fn format_price(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "-".to_string())
}

fn table_lines(rows: &[Row], scroll: usize, visible: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let header: Vec<(&str, ColumnAlign, usize)> = TABLE_COLUMNS.to_vec();
    lines.push(Line::from(Span::styled(
        format_columns(&header),
        Style::default()
            .fg(Color::Gray)
            .add_modifier(Modifier::BOLD),
    )));
    if rows.is_empty() {
        lines.push(Line::from("该时刻暂无数据"));
        return lines;
    }
    let list_visible = visible.saturating_sub(1);
    let (start, end) = visible_range(rows.len(), list_visible, scroll);
    for (offset, row) in rows[start..end].iter().enumerate() {
        let background = if (start + offset) % 2 == 0 {
            Color::Reset
        } else {
            Color::Rgb(30, 30, 36)
        };
        let mut spans = Vec::with_capacity(TABLE_COLUMNS.len() * 2);
        for (idx, ((value, color), (_, align, width))) in
            table_cells(row).into_iter().zip(TABLE_COLUMNS.iter()).enumerate()
        {
            spans.push(Span::styled(
                format_column_value(&value, *align, *width),
                Style::default().fg(color).bg(background),
            ));
            if idx + 1 != TABLE_COLUMNS.len() {
                spans.push(Span::styled(" ", Style::default().bg(background)));
            }
        }
        lines.push(Line::from(spans));
    }
    lines
}

fn format_columns(columns: &[(&str, ColumnAlign, usize)]) -> String {
    let mut row = String::new();
    for (idx, (value, align, width)) in columns.iter().enumerate() {
        row.push_str(&format_column_value(value, *align, *width));
        if idx + 1 != columns.len() {
            row.push(' ');
        }
    }
    row
}

fn format_column_value(value: &str, align: ColumnAlign, width: usize) -> String {
    let clipped = clip_to_width(value, width);
    pad_to_width(&clipped, width, align)
}

fn clip_to_width(value: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(value) <= width {
        return value.to_string();
    }
    let mut result = String::new();
    let mut remaining = width.saturating_sub(1);
    for ch in value.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if ch_width > remaining {
            break;
        }
        result.push(ch);
        remaining = remaining.saturating_sub(ch_width);
    }
    result.push('…');
    result
}

fn pad_to_width(value: &str, width: usize, align: ColumnAlign) -> String {
    let current = UnicodeWidthStr::width(value);
    if current >= width {
        return value.to_string();
    }
    let padding = " ".repeat(width - current);
    match align {
        ColumnAlign::Left => format!("{value}{padding}"),
        ColumnAlign::Right => format!("{padding}{value}"),
    }
}

fn visible_range(len: usize, visible: usize, selected: usize) -> (usize, usize) {
    if len == 0 || visible == 0 {
        return (0, 0);
    }
    if len <= visible {
        return (0, len);
    }
    let max_start = len - visible;
    let start = selected.min(len - 1).min(max_start);
    (start, start + visible)
}
