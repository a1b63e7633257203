use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use chatflow_core::bridge::run_udp_bridge;
use chatflow_core::demo::{DemoGenerator, DemoHandle};
use chatflow_core::service::load_buffered_into;
use chatflow_core::view::{
    kind_color, live_feed, room, spiral_layout, thread_cards, DashboardStats,
};
use chatflow_core::{Config, FlowHandle, FlowService, MessageType, Snapshot};

/// Frames a node keeps pulsing after it receives a message
const PULSE_FRAMES: u8 = 6;

fn rgb(color: u32) -> Color {
    Color::Rgb((color >> 16) as u8, (color >> 8) as u8, color as u8)
}

struct App {
    handle: FlowHandle,
    config: Config,
    demo: Option<DemoHandle>,
    threads: ListState,
    room: Option<String>,
    pulse: HashMap<String, u8>,
    seen: HashMap<String, usize>,
    animation_frame: u64,
    notice: Option<String>,
    /// Messages from background tasks, shown at the top of the feed
    notices: mpsc::UnboundedReceiver<String>,
}

impl App {
    fn new(handle: FlowHandle, config: Config, notices: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            handle,
            config,
            demo: None,
            threads: ListState::default(),
            room: None,
            pulse: HashMap::new(),
            seen: HashMap::new(),
            animation_frame: 0,
            notice: None,
            notices,
        }
    }

    fn toggle_demo(&mut self) {
        match self.demo.take() {
            // The generator puts the previous banner back as it exits
            Some(demo) => {
                demo.cancel();
                self.notice = Some("Demo stopped".to_string());
            }
            None => match DemoGenerator::from_config(&self.config).start(self.handle.clone()) {
                Ok(demo) => self.demo = Some(demo),
                Err(e) => self.notice = Some(format!("Demo failed: {}", e)),
            },
        }
    }

    fn move_selection(&mut self, delta: isize, len: usize) {
        if len == 0 {
            self.threads.select(None);
            return;
        }
        let current = self.threads.selected().unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len as isize) as usize;
        self.threads.select(Some(next));
    }

    /// Start pulsing threads whose history grew since the last frame
    fn track_activity(&mut self, snapshot: &Snapshot) {
        for thread in snapshot.board.threads() {
            let count = thread.messages.len();
            let previous = self.seen.insert(thread.id.clone(), count);
            if previous.map_or(true, |p| p != count) {
                self.pulse.insert(thread.id.clone(), PULSE_FRAMES);
            }
        }
    }

    fn drain_notices(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            self.notice = Some(notice);
        }
    }

    fn tick(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
        self.pulse.retain(|_, v| {
            *v = v.saturating_sub(1);
            *v > 0
        });
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let (handle, _ingest) = FlowService::spawn(&config);
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let mut app = App::new(handle.clone(), config.clone(), notice_rx);

    // Bridge listener task
    match UdpSocket::bind(config.bridge_addr).await {
        Ok(sock) => {
            let handle = handle.clone();
            let notice_tx = notice_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = run_udp_bridge(sock, handle).await {
                    let _ = notice_tx.send(format!("Bridge stopped: {}", e));
                }
            });
        }
        Err(e) => {
            app.notice = Some(format!("Bridge unavailable on {}: {}", config.bridge_addr, e))
        }
    }

    if let Some(path) = config.buffered_path.clone() {
        let handle = handle.clone();
        let delay = config.load_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let notice = match load_buffered_into(&handle, &path).await {
                Ok(0) => format!("No buffered messages in {}", path.display()),
                Ok(n) => format!("Loaded {} buffered message(s)", n),
                Err(e) => format!("Buffered load from {} failed: {}", path.display(), e),
            };
            let _ = notice_tx.send(notice);
        });
    }

    if config.demo {
        app.toggle_demo();
    }

    // TUI setup
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let res = run_app(&mut terminal, &mut app);
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Some(demo) = app.demo.take() {
        demo.stop().await;
    }

    if let Err(e) = res {
        eprintln!("TUI error: {e}");
    }
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> std::io::Result<()> {
    let mut last_redraw = Instant::now();

    loop {
        let snapshot = app.handle.snapshot();
        let thread_count = snapshot.board.thread_count();

        // Handle keys
        if crossterm::event::poll(Duration::from_millis(5))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Esc => {
                        if app.room.take().is_none() {
                            return Ok(());
                        }
                    }
                    KeyCode::Char('d') => app.toggle_demo(),
                    KeyCode::Up | KeyCode::Char('k') => app.move_selection(-1, thread_count),
                    KeyCode::Down | KeyCode::Char('j') => app.move_selection(1, thread_count),
                    KeyCode::Enter => {
                        let cards = snapshot.board.sorted_threads();
                        app.room = app
                            .threads
                            .selected()
                            .and_then(|i| cards.get(i))
                            .map(|t| t.id.clone());
                    }
                    _ => {}
                }
            }
        }

        // Redraw ~30 FPS cap
        if last_redraw.elapsed() >= Duration::from_millis(33) {
            app.drain_notices();
            app.track_activity(&snapshot);
            terminal.draw(|f| draw(f, app, &snapshot))?;
            last_redraw = Instant::now();
            app.tick();
        }

        std::thread::sleep(Duration::from_millis(8));
    }
}

fn draw(f: &mut Frame, app: &mut App, snapshot: &Snapshot) {
    let board = &snapshot.board;
    let stats = DashboardStats::from_aggregator(board);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(10), Constraint::Length(9)].as_ref())
        .split(f.size());
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)].as_ref())
        .split(rows[1]);

    // Header: status and counters
    let demo_hint = if app.demo.as_ref().map_or(false, |d| d.is_running()) {
        "d: stop demo"
    } else {
        "d: start demo"
    };
    let header = Line::from(vec![
        Span::styled(
            format!(" {} ", snapshot.status.connection_text),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{}   ", snapshot.status.stream_title)),
        Span::raw(format!("Messages: {}  ", stats.total)),
        Span::styled(format!("Threads: {}  ", stats.threads), Style::default().fg(Color::Green)),
        Span::styled(format!("Direct: {}  ", stats.direct), Style::default().fg(Color::Blue)),
        Span::styled(format!("Spam: {}  ", stats.spam), Style::default().fg(Color::Red)),
        Span::styled(
            format!("{}  ↑↓ Enter  q: quit", demo_hint),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    f.render_widget(
        Paragraph::new(header).block(Block::default().title("ChatFlow").borders(Borders::ALL)),
        rows[0],
    );

    draw_spiral(f, app, board, middle[0]);
    draw_threads(f, app, board, middle[1]);
    draw_feed(f, app, board, rows[2]);

    if let Some(thread_id) = &app.room {
        let screen = f.size();
        draw_room(f, board, thread_id, screen);
    }
}

fn draw_spiral(f: &mut Frame, app: &App, board: &chatflow_core::Aggregator, area: Rect) {
    let grid_w = area.width.saturating_sub(2) as usize;
    let grid_h = area.height.saturating_sub(2) as usize;
    let block = Block::default().title("Conversation Spiral").borders(Borders::ALL);
    if grid_w < 3 || grid_h < 3 {
        f.render_widget(block, area);
        return;
    }

    // Fixed seed keeps node depth stable between frames
    let mut rng = StdRng::seed_from_u64(42);
    let nodes = spiral_layout(board, &mut rng);
    let extent = nodes
        .iter()
        .map(|n| n.x.abs().max(n.y.abs()))
        .fold(1.0_f64, f64::max);

    let mut grid: Vec<Vec<(char, Style)>> = vec![vec![(' ', Style::default()); grid_w]; grid_h];
    let mut labels = Vec::new();

    for node in &nodes {
        let cx = ((node.x / extent + 1.0) / 2.0 * (grid_w - 1) as f64).round() as usize;
        let cy = ((1.0 - (node.y / extent + 1.0) / 2.0) * (grid_h - 1) as f64).round() as usize;
        let (cx, cy) = (cx.min(grid_w - 1), cy.min(grid_h - 1));

        let pulsing = app.pulse.contains_key(&node.thread_id);
        let mut style = Style::default().fg(rgb(node.color));
        if pulsing {
            let phase = (app.animation_frame / 2) % 2;
            style = style
                .fg(if phase == 0 { Color::Yellow } else { Color::White })
                .add_modifier(Modifier::BOLD);
        } else if node.z < 0.0 {
            // Far side of the spiral
            style = style.add_modifier(Modifier::DIM);
        }

        let ch = if node.radius >= 6.0 {
            '◉'
        } else if node.radius >= 3.0 {
            '●'
        } else {
            '•'
        };
        grid[cy][cx] = (ch, style);
        labels.push((cx, cy, node.thread_id.clone()));
    }

    let mut lines: Vec<Line> = grid
        .iter()
        .map(|row| {
            Line::from(
                row.iter()
                    .map(|&(ch, style)| Span::styled(ch.to_string(), style))
                    .collect::<Vec<_>>(),
            )
        })
        .collect();

    // Name the node at the end of its row when there is room
    for (x, y, name) in labels {
        let room_left = grid_w.saturating_sub(x + 1);
        if room_left > 2 {
            let mut s: String = name.chars().take(room_left).collect();
            s.insert(0, ' ');
            lines[y].spans.push(Span::styled(s, Style::default().fg(Color::Gray)));
        }
    }

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_threads(f: &mut Frame, app: &mut App, board: &chatflow_core::Aggregator, area: Rect) {
    let cards = thread_cards(board);
    let block = Block::default().title("Threads").borders(Borders::ALL);

    if cards.is_empty() {
        app.threads.select(None);
        let empty = Paragraph::new("No conversations yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(empty, area);
        return;
    }

    if app.threads.selected().map_or(true, |i| i >= cards.len()) {
        app.threads.select(Some(0));
    }

    let items: Vec<ListItem> = cards
        .iter()
        .map(|card| {
            let label_style = Style::default()
                .fg(rgb(kind_color(&card.kind)))
                .add_modifier(Modifier::BOLD);
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(format!("{:<7}", card.label), label_style),
                    Span::raw(format!(" {} msgs", card.message_count)),
                ]),
                Line::from(Span::styled(
                    card.participants.clone(),
                    Style::default().fg(Color::Cyan),
                )),
                Line::from(Span::styled(
                    card.preview.clone(),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("▶ ");
    f.render_stateful_widget(list, area, &mut app.threads);
}

fn draw_feed(f: &mut Frame, app: &App, board: &chatflow_core::Aggregator, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let mut lines: Vec<Line> = live_feed(board, app.config.feed_size.min(visible))
        .into_iter()
        .map(|entry| {
            let color = match entry.kind {
                MessageType::Spam => Color::Red,
                MessageType::Thread => Color::Green,
                _ => Color::White,
            };
            Line::from(vec![
                Span::styled(format!("@{} ", entry.author), Style::default().fg(Color::Cyan)),
                Span::styled(entry.text, Style::default().fg(color)),
            ])
        })
        .collect();

    if let Some(notice) = &app.notice {
        if lines.len() >= visible && !lines.is_empty() {
            lines.pop();
        }
        let notice = Span::styled(notice.clone(), Style::default().fg(Color::Yellow));
        lines.insert(0, Line::from(notice));
    }

    f.render_widget(
        Paragraph::new(lines).block(Block::default().title("Live Feed").borders(Borders::ALL)),
        area,
    );
}

fn draw_room(f: &mut Frame, board: &chatflow_core::Aggregator, thread_id: &str, screen: Rect) {
    let area = Rect {
        x: screen.width / 8,
        y: screen.height / 8,
        width: screen.width * 3 / 4,
        height: screen.height * 3 / 4,
    };

    let (title, lines) = match room(board, thread_id) {
        Some(view) => {
            let lines = view
                .entries
                .into_iter()
                .map(|entry| {
                    let indent = if entry.is_reply { "  ↳ " } else { "" };
                    Line::from(vec![
                        Span::raw(indent),
                        Span::styled(
                            format!("{} ", entry.time),
                            Style::default().fg(Color::DarkGray),
                        ),
                        Span::styled(
                            format!("@{} ", entry.author),
                            Style::default().fg(Color::Cyan),
                        ),
                        Span::raw(entry.text),
                    ])
                })
                .collect::<Vec<_>>();
            (view.title, lines)
        }
        None => (thread_id.to_string(), vec![Line::from("Thread not found")]),
    };

    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(format!("{}  (Esc to close)", title))
                .borders(Borders::ALL),
        ),
        area,
    );
}
