use std::io::stdout;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
        MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Paragraph},
};
use sensorline_core::TimelineSession;
use sensorline_core::playback::{PlaybackNotice, Transition};
use sensorline_core::source::from_timeline_units;
use sensorline_core::views::{density_bins, layout_lane, overview_band, playback_indicator_px};
use sensorline_protocol::CollectionKind;

use crate::player::SimulatedAudio;

/// Wheel delta of one mouse wheel notch.
const WHEEL_NOTCH: f64 = 120.0;
const KEY_ZOOM: f64 = 1.3;
const DENSITY_LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

const IMAGES_ROW: u16 = 3;
const AUDIO_ROW: u16 = 5;
const OVERVIEW_ROW: u16 = 7;

struct App {
    session: TimelineSession,
    audio: SimulatedAudio,
    started: Instant,
    hash: Option<String>,
    status: String,
}

impl App {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn view_changed(&mut self) {
        let now = self.now_ms();
        self.session.note_view_changed(now);
    }

    fn apply(&mut self, transition: Transition) {
        self.audio.apply(&transition.command, &self.session);
        self.status = match transition.notice {
            Some(PlaybackNotice::AmbiguousOverlap {
                candidates, chosen, ..
            }) => format!("{} clips overlap, playing #{chosen}", candidates.len()),
            Some(PlaybackNotice::EmptyOverlap { .. }) => "no audio here".to_string(),
            None => String::new(),
        };
        self.view_changed();
    }
}

pub fn run(session: TimelineSession) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App {
        session,
        audio: SimulatedAudio::default(),
        started: Instant::now(),
        hash: None,
        status: String::new(),
    };
    app.view_changed();
    let mut last_tick = Instant::now();

    loop {
        let area = terminal.size()?;
        let width = f64::from(area.width);
        app.session.set_viewport_width(width);

        let elapsed = last_tick.elapsed();
        last_tick = Instant::now();
        let was_playing = app.audio.is_playing();
        match app.audio.tick(elapsed, &mut app.session) {
            Some(next) => app.apply(next),
            // The cursor moved; the debouncer's max wait paces the writes.
            None if was_playing => app.view_changed(),
            None => {}
        }
        if let Some(written) = app.session.poll_persist(app.now_ms()) {
            app.hash = Some(written);
        }

        terminal.draw(|frame| draw(frame, &app))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Left => {
                    app.session.viewport_mut().pan_by(-width * 0.1, width);
                    app.view_changed();
                }
                KeyCode::Right => {
                    app.session.viewport_mut().pan_by(width * 0.1, width);
                    app.view_changed();
                }
                KeyCode::Char('+') | KeyCode::Char('=') => {
                    app.session.viewport_mut().zoom_by(KEY_ZOOM, width);
                    app.view_changed();
                }
                KeyCode::Char('-') => {
                    app.session.viewport_mut().zoom_by(1.0 / KEY_ZOOM, width);
                    app.view_changed();
                }
                KeyCode::Char(' ') => {
                    let transition = app.session.toggle_play();
                    app.apply(transition);
                }
                _ => {}
            },
            Event::Mouse(mouse) => {
                let column = f64::from(mouse.column);
                match mouse.kind {
                    MouseEventKind::ScrollUp => {
                        app.session.viewport_mut().zoom_at(column, -WHEEL_NOTCH, 0.0);
                        app.view_changed();
                    }
                    MouseEventKind::ScrollDown => {
                        app.session.viewport_mut().zoom_at(column, WHEEL_NOTCH, 0.0);
                        app.view_changed();
                    }
                    MouseEventKind::ScrollLeft => {
                        app.session.viewport_mut().pan_by(-10.0, width);
                        app.view_changed();
                    }
                    MouseEventKind::ScrollRight => {
                        app.session.viewport_mut().pan_by(10.0, width);
                        app.view_changed();
                    }
                    MouseEventKind::Down(MouseButton::Left) if mouse.row < OVERVIEW_ROW => {
                        let transition = app.session.seek_at_pixel(column);
                        app.apply(transition);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    Ok(())
}

fn format_time(t: f64) -> String {
    from_timeline_units(t).map_or_else(
        || "?".to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let session = &app.session;
    let viewport = session.viewport();
    let scroll = viewport.scroll_offset_px();

    let range = session
        .visible_range()
        .map_or_else(|| "no data".to_string(), |(s, e)| {
            format!("{} - {}", format_time(s), format_time(e))
        });
    let header = Block::default()
        .title(format!(
            " sensorline | {range} | ←→ pan | +/- zoom | click seek | space play | q quit "
        ))
        .style(Style::default().fg(Color::White).bg(Color::DarkGray));
    frame.render_widget(header, Rect::new(0, 0, area.width, 1));

    let playback = session.playback();
    let clock = if app.audio.is_playing() {
        format!(
            "▶ #{} {:.0}s",
            app.audio.clip().unwrap_or_default(),
            app.audio.local_seconds()
        )
    } else {
        "■".to_string()
    };
    let position = playback
        .global_position
        .map_or_else(|| "-".to_string(), format_time);
    let status = format!(
        " {clock} | at {position} | {} | #{}",
        app.status,
        app.hash.as_deref().unwrap_or("")
    );
    frame.render_widget(
        Paragraph::new(status).style(Style::default().fg(Color::Gray)),
        Rect::new(0, 1, area.width, 1),
    );

    let buf = frame.buffer_mut();
    let active = playback.active_record_id();
    for (kind, row, color) in [
        (CollectionKind::Images, IMAGES_ROW, Color::Yellow),
        (CollectionKind::Audio, AUDIO_ROW, Color::Magenta),
    ] {
        if row >= area.height {
            continue;
        }
        let label = format!("{kind}");
        for (i, ch) in label.chars().enumerate() {
            let x = i as u16;
            if x < area.width {
                buf[(x, row - 1)].set_char(ch).set_fg(Color::DarkGray);
            }
        }
        let records = session.visible_records(kind);
        let items = layout_lane(
            kind,
            records.iter().map(|r| (r.id, r.interval)),
            viewport,
            1.0,
        );
        for item in items {
            let left = item.screen_left(scroll).floor();
            let right = (left + item.width_px).ceil().min(f64::from(area.width));
            let fg = if kind == CollectionKind::Audio && Some(item.id) == active {
                Color::LightGreen
            } else {
                color
            };
            let mut x = left.max(0.0);
            while x < right {
                buf[(x as u16, row)].set_char('█').set_fg(fg);
                x += 1.0;
            }
        }
    }

    if let Some(px) = playback_indicator_px(viewport, playback.global_position) {
        let x = (px - scroll).floor();
        if x >= 0.0 && x < f64::from(area.width) {
            for y in 2..OVERVIEW_ROW.min(area.height) {
                buf[(x as u16, y)].set_char('│').set_fg(Color::Red);
            }
        }
    }

    draw_overview(buf, area, session);
}

fn draw_overview(buf: &mut ratatui::buffer::Buffer, area: Rect, session: &TimelineSession) {
    if OVERVIEW_ROW >= area.height || area.width == 0 {
        return;
    }
    let Some(domain) = session.domain() else {
        return;
    };
    let intervals = CollectionKind::ALL
        .into_iter()
        .flat_map(|kind| session.collection(kind).records().iter().map(|r| r.interval));
    let bins = density_bins(intervals, domain, usize::from(area.width));
    let peak = bins.iter().copied().max().unwrap_or(0).max(1);
    let band = session
        .visible_range()
        .and_then(|window| overview_band(domain, window));

    let width = f64::from(area.width);
    for (i, count) in bins.iter().enumerate() {
        let level = (*count as usize * (DENSITY_LEVELS.len() - 1)).div_ceil(peak as usize);
        let ch = DENSITY_LEVELS[level.min(DENSITY_LEVELS.len() - 1)];
        let frac = (i as f64 + 0.5) / width;
        let highlighted = band.is_some_and(|(s, e)| frac >= s && frac <= e);
        let bg = if highlighted { Color::DarkGray } else { Color::Black };
        buf[(i as u16, OVERVIEW_ROW)]
            .set_char(ch)
            .set_fg(Color::Blue)
            .set_bg(bg);
    }
}
