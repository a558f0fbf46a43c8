//! Live dashboard for a two-sensor test session.
//!
//! Usage:
//!   cargo run --bin tui -- /dev/ttyUSB0 /dev/ttyUSB1
//!   cargo run --bin tui                # first two serial ports found
//!   cargo run --bin tui -- --simulate  # two built-in simulated sensors
//!
//! Takes the same options as `lips`.  Output files are named by `--name` for
//! the first session and by timestamp after that.
//!
//! Keys
//! ----
//!   1 / 2 / 3   channel 1, channel 2, oscillation
//!   Tab         next tab
//!   y / n       answer the end-of-session prompt
//!   q / Esc     quit

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{error, info};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Clear, Dataset, GraphType, Paragraph, Tabs},
    Frame, Terminal,
};

use lips_rs::channel::{ChannelDiagnostics, SensorChannel};
use lips_rs::cli::CliOptions;
use lips_rs::export::{CsvSink, ExportSink, SinkError};
use lips_rs::session::{SessionControl, SessionState, TestSession};
use lips_rs::transport::ByteStream;

type Session = TestSession<Box<dyn ByteStream>, CsvSink>;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Fixed acceleration axis, m/s².
const ACCEL_RANGE: f64 = 20.0;

/// Redraw period (~30 FPS).  Session ticks run independently of it.
const FRAME: Duration = Duration::from_millis(33);

const AXIS_COLORS: [Color; 3] = [Color::Red, Color::Green, Color::Blue];
const CHANNEL_COLORS: [Color; 2] = [Color::Red, Color::Green];

const TAB_TITLES: [&str; 3] = ["Accelerometer 1", "Accelerometer 2", "Oscillation"];

// ── Operator ──────────────────────────────────────────────────────────────────

/// Answers the session's questions from the UI.  File names are never typed
/// in the dashboard; the end-of-session answer is set by a key press just
/// before the session asks for it.
struct TuiOperator {
    out_dir: PathBuf,
    first_name: Option<String>,
    answer: Option<bool>,
}

impl SessionControl for TuiOperator {
    type Sink = CsvSink;

    fn request_file_name(&mut self) -> String {
        self.first_name.take().unwrap_or_default()
    }

    fn open_sink(&mut self, name: &str) -> Result<CsvSink, SinkError> {
        CsvSink::create(&self.out_dir, name)
    }

    fn notify_session_ended(&mut self) -> bool {
        self.answer.take().unwrap_or(false)
    }
}

// ── App state ─────────────────────────────────────────────────────────────────

struct App {
    tab: usize,
    simulated: bool,
    last_error: Option<String>,
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Header, tab bar, chart, footer; plus the restart prompt when the session
/// is waiting for an answer.
fn draw(frame: &mut Frame, app: &App, session: &Session) {
    let area = frame.area();
    let root = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(4),
    ])
    .split(area);

    draw_header(frame, root[0], app, session);
    draw_tabs(frame, root[1], app);
    match app.tab {
        0 | 1 => draw_channel(frame, root[2], app.tab, &session.channels()[app.tab]),
        _ => draw_oscillation(frame, root[2], session),
    }
    draw_footer(frame, root[3], app, session);

    if session.state() == SessionState::AwaitingRestartDecision {
        draw_restart_prompt(frame, area, session);
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

fn draw_header(frame: &mut Frame, area: Rect, app: &App, session: &Session) {
    let (label, color) = match session.state() {
        SessionState::Running => ("● Running", Color::Green),
        SessionState::AwaitingRestartDecision => ("◆ Complete", Color::Yellow),
        SessionState::Stopped => ("■ Stopped", Color::Red),
    };
    let source = if app.simulated { "simulated" } else { "serial" };

    let elapsed = session.elapsed(Instant::now()).min(session.config().session_limit);
    let clock = format!(
        "{} / {}",
        mmss(elapsed),
        mmss(session.config().session_limit)
    );

    let line = Line::from(vec![
        Span::styled(
            " LIPS Monitor ",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        sep(),
        Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::styled(format!(" ({source})"), Style::default().fg(Color::DarkGray)),
        sep(),
        Span::styled(clock, Style::default().fg(Color::LightBlue)),
        sep(),
        Span::styled(session.sink().describe(), Style::default().fg(Color::White)),
        sep(),
        Span::styled(
            format!("{} rows", session.exports()),
            Style::default().fg(Color::White),
        ),
        sep(),
        Span::styled(
            format!("tick {:.1} ms", session.last_tick_duration().as_secs_f64() * 1e3),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

fn mmss(d: Duration) -> String {
    let s = d.as_secs();
    format!("{:02}:{:02}", s / 60, s % 60)
}

#[inline]
fn sep<'a>() -> Span<'a> {
    Span::styled(" │ ", Style::default().fg(Color::DarkGray))
}

fn draw_tabs(frame: &mut Frame, area: Rect, app: &App) {
    let tabs = Tabs::new(TAB_TITLES.iter().enumerate().map(|(i, t)| format!("{} {t}", i + 1)))
        .select(app.tab)
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, area);
}

// ── Charts ────────────────────────────────────────────────────────────────────

/// ax/ay/az against sample index over the whole window.
fn draw_channel<S>(frame: &mut Frame, area: Rect, idx: usize, channel: &SensorChannel<S>) {
    let window = channel.acceleration_window();
    let cap = window.capacity() as f64;

    let series: [Vec<(f64, f64)>; 3] = [0, 1, 2].map(|axis| {
        window
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let v = [s.ax, s.ay, s.az][axis];
                (i as f64, v.clamp(-ACCEL_RANGE, ACCEL_RANGE))
            })
            .collect()
    });

    let datasets: Vec<Dataset> = ["X", "Y", "Z"]
        .iter()
        .zip(series.iter())
        .zip(AXIS_COLORS)
        .map(|((name, data), color)| {
            Dataset::default()
                .name(*name)
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(data)
        })
        .collect();

    let title = format!(
        " {}  Frequency: {:.2} Hz ",
        TAB_TITLES[idx],
        channel.frequency()
    );

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(Span::styled(
                    title,
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .bounds([0.0, cap])
                .labels(vec!["0".to_string(), format!("{:.0}", cap / 2.0), format!("{cap:.0}")])
                .style(Style::default().fg(Color::DarkGray)),
        )
        .y_axis(
            Axis::default()
                .bounds([-ACCEL_RANGE, ACCEL_RANGE])
                .labels(vec![
                    format!("{:+.0}", -ACCEL_RANGE),
                    "0".to_string(),
                    format!("{:+.0}", ACCEL_RANGE),
                ])
                .style(Style::default().fg(Color::DarkGray)),
        );

    frame.render_widget(chart, area);
}

/// Both channels' oscillation magnitude, y axis fitted to the window peak.
fn draw_oscillation(frame: &mut Frame, area: Rect, session: &Session) {
    let series: Vec<Vec<(f64, f64)>> = session
        .channels()
        .iter()
        .map(|ch| {
            ch.oscillation_window()
                .iter()
                .enumerate()
                .map(|(i, o)| (i as f64, o.magnitude))
                .collect()
        })
        .collect();

    let peak = series
        .iter()
        .flatten()
        .map(|&(_, v)| v)
        .fold(0.0_f64, f64::max);
    let top = peak + 1.0;
    let cap = session.channels()[0].oscillation_window().capacity() as f64;

    let datasets: Vec<Dataset> = series
        .iter()
        .enumerate()
        .map(|(i, data)| {
            Dataset::default()
                .name(format!("Oscillation {}", i + 1))
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(CHANNEL_COLORS[i]))
                .data(data)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(Span::styled(
                    " Oscillation ",
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .bounds([0.0, cap])
                .labels(vec!["0".to_string(), format!("{cap:.0}")])
                .style(Style::default().fg(Color::DarkGray)),
        )
        .y_axis(
            Axis::default()
                .bounds([0.0, top])
                .labels(vec!["0".to_string(), format!("{:.1}", top / 2.0), format!("{top:.1}")])
                .style(Style::default().fg(Color::DarkGray)),
        );

    frame.render_widget(chart, area);
}

// ── Footer ────────────────────────────────────────────────────────────────────

/// Key hints, then one diagnostics line per channel (or the last error).
fn draw_footer(frame: &mut Frame, area: Rect, app: &App, session: &Session) {
    let keys = Line::from(vec![
        Span::raw(" "),
        key("[1-3]"),
        Span::raw("Tab  "),
        key("[Tab]"),
        Span::raw("Next  "),
        key("[q]"),
        Span::raw("Quit"),
    ]);

    let mut lines = vec![keys];
    if let Some(err) = &app.last_error {
        lines.push(Line::from(Span::styled(
            format!(" {err}"),
            Style::default().fg(Color::Red),
        )));
    } else {
        for ch in session.channels() {
            lines.push(diagnostics_line(ch.name(), ch.diagnostics()));
        }
    }

    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::TOP)),
        area,
    );
}

fn diagnostics_line(name: &str, d: ChannelDiagnostics) -> Line<'static> {
    let faults = d.checksum_failures + d.wrong_tags + d.truncated_frames + d.invalid_responses;
    let color = if d.stream_faults > 0 {
        Color::Red
    } else if faults > 0 {
        Color::Yellow
    } else {
        Color::DarkGray
    };
    Line::from(Span::styled(
        format!(
            " {name}: {} samples  checksum {}  tag {}  short {}  resp {}  header {}  link {}",
            d.samples,
            d.checksum_failures,
            d.wrong_tags,
            d.truncated_frames,
            d.invalid_responses,
            d.header_mismatches,
            d.stream_faults
        ),
        Style::default().fg(color),
    ))
}

#[inline]
fn key(s: &str) -> Span<'_> {
    Span::styled(
        s,
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )
}

// ── Restart prompt ────────────────────────────────────────────────────────────

fn draw_restart_prompt(frame: &mut Frame, area: Rect, session: &Session) {
    let box_w = 48.min(area.width);
    let box_h = 6.min(area.height);
    let x = area.x + (area.width.saturating_sub(box_w)) / 2;
    let y = area.y + (area.height.saturating_sub(box_h)) / 2;
    let popup = Rect::new(x, y, box_w, box_h);

    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(vec![
            Line::from(format!(" {} rows written.", session.exports())),
            Line::from(" Restart the test?"),
            Line::from(""),
            Line::from(vec![
                key(" [y]"),
                Span::raw(" Restart  "),
                key("[n]"),
                Span::raw(" Stop"),
            ]),
        ])
        .block(
            Block::default()
                .title(Span::styled(
                    " Test complete ",
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        ),
        popup,
    );
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let opts = CliOptions::parse();

    if !io::stdout().is_terminal() {
        eprintln!("Error: lips tui requires a real terminal (TTY).");
        std::process::exit(1);
    }

    // ── Logging ─────────────────────────────────────────────────────────────
    // Logs go to lips-tui.log in the current directory so they never draw
    // over the dashboard.
    {
        use std::fs::File;
        if let Ok(file) = File::create("lips-tui.log") {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .target(env_logger::Target::Pipe(Box::new(file)))
                .init();
        }
    }

    let config = opts.session_config();
    let tick_interval = config.tick_interval;

    // ── Session ───────────────────────────────────────────────────────────────
    let [first, second] = opts.open_streams()?;
    let mut operator = TuiOperator {
        out_dir: opts.out_dir.clone(),
        first_name: opts.name.clone(),
        answer: None,
    };
    let mut session: Session =
        TestSession::start(first, second, config, &mut operator, Instant::now())
            .context("starting session")?;

    let mut app = App {
        tab: 0,
        simulated: opts.simulate,
        last_error: None,
    };

    // ── Terminal setup ────────────────────────────────────────────────────────
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut next_tick = Instant::now();
    let mut next_frame = Instant::now();

    // ── Main loop ─────────────────────────────────────────────────────────────
    'main: loop {
        // ── 1. Tick the session when due ──────────────────────────────────────
        let now = Instant::now();
        if now >= next_tick {
            session.tick(now);
            next_tick = now + tick_interval;
        }

        // ── 2. Render ─────────────────────────────────────────────────────────
        if now >= next_frame {
            terminal.draw(|f| draw(f, &app, &session))?;
            next_frame = now + FRAME;
        }

        // ── 3. Handle keyboard until the next deadline ────────────────────────
        let wait = next_tick.min(next_frame).saturating_duration_since(Instant::now());
        if !event::poll(wait)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };

        let ctrl_c =
            key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
        if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) || ctrl_c {
            break 'main;
        }

        // ── Restart prompt keys ───────────────────────────────────────────────
        if session.state() == SessionState::AwaitingRestartDecision {
            let answer = match key.code {
                KeyCode::Char('y') | KeyCode::Enter => true,
                KeyCode::Char('n') => false,
                _ => continue,
            };
            operator.answer = Some(answer);
            match session.conclude(&mut operator, Instant::now()) {
                Ok(SessionState::Stopped) => info!("Operator declined restart"),
                Ok(_) => app.last_error = None,
                Err(e) => {
                    error!("Restart failed: {e}");
                    app.last_error = Some(format!("Restart failed: {e}"));
                }
            }
            next_tick = Instant::now();
            continue;
        }

        // ── Normal keys ───────────────────────────────────────────────────────
        match key.code {
            KeyCode::Char(c @ '1'..='3') => app.tab = c as usize - '1' as usize,
            KeyCode::Tab => app.tab = (app.tab + 1) % TAB_TITLES.len(),
            _ => {}
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────
    session.stop();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
