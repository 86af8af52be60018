use std::io::stdout;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame, Terminal,
};
use zoopeek_core::display_width;
use zoopeek_engine::{Pager, PagerControl, PagerUpdate};

/// How the pager session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Quit; the last render stays on screen
    Quit(String),
    /// The message was deleted
    Dismissed,
}

/// Scroll granularity: arrow keys, page keys, big jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stride {
    Line,
    Page,
    Jump,
}

pub struct PagerView {
    pager: Pager,
    /// Last rendered message
    text: String,
    title: String,
    scroll_steps: Vec<i64>,
    page_size_choices: Vec<usize>,
    /// Horizontal offset of the message, for tables wider than the terminal
    h_scroll: u16,
    should_quit: bool,
    dismissed: bool,
    show_help: bool,
}

impl PagerView {
    pub fn new(pager: Pager, title: String, scroll_steps: Vec<i64>, page_size_choices: Vec<usize>) -> Self {
        let text = pager.render();
        Self {
            pager,
            text,
            title,
            scroll_steps,
            page_size_choices,
            h_scroll: 0,
            should_quit: false,
            dismissed: false,
            show_help: false,
        }
    }

    fn outcome(self) -> Outcome {
        if self.dismissed {
            Outcome::Dismissed
        } else {
            Outcome::Quit(self.text)
        }
    }

    /// Step for a direction and stride, taken from the configured steps
    /// ordered by magnitude. Missing strides fall back to the largest step.
    fn step(&self, forward: bool, stride: Stride) -> Option<i64> {
        let mut steps: Vec<i64> = self
            .scroll_steps
            .iter()
            .copied()
            .filter(|s| if forward { *s > 0 } else { *s < 0 })
            .collect();
        steps.sort_by_key(|s| s.unsigned_abs());
        let idx = match stride {
            Stride::Line => 0,
            Stride::Page => 1,
            Stride::Jump => 2,
        };
        steps.get(idx).or(steps.last()).copied()
    }

    fn handle_key(&mut self, key: KeyEvent, now: Instant) {
        if self.show_help {
            // Any key dismisses help
            self.show_help = false;
            return;
        }

        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        let control = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('?') => {
                self.show_help = true;
                return;
            }
            KeyCode::Home => {
                self.h_scroll = 0;
                return;
            }
            KeyCode::Left => {
                self.h_scroll = self.h_scroll.saturating_sub(1);
                return;
            }
            KeyCode::Right => {
                if self.h_scroll < self.max_h_scroll() {
                    self.h_scroll += 1;
                }
                return;
            }
            KeyCode::Char('d') | KeyCode::Delete => Some(PagerControl::Dismiss),
            KeyCode::Up | KeyCode::Char('k') => self.step(false, Stride::Line).map(PagerControl::ScrollBy),
            KeyCode::Down | KeyCode::Char('j') => self.step(true, Stride::Line).map(PagerControl::ScrollBy),
            KeyCode::PageUp if shift => self.step(false, Stride::Jump).map(PagerControl::ScrollBy),
            KeyCode::PageDown if shift => self.step(true, Stride::Jump).map(PagerControl::ScrollBy),
            KeyCode::PageUp => self.step(false, Stride::Page).map(PagerControl::ScrollBy),
            KeyCode::PageDown => self.step(true, Stride::Page).map(PagerControl::ScrollBy),
            KeyCode::Char('[') => self.step(false, Stride::Jump).map(PagerControl::ScrollBy),
            KeyCode::Char(']') => self.step(true, Stride::Jump).map(PagerControl::ScrollBy),
            // 1-9: page size by menu position
            KeyCode::Char(c @ '1'..='9') => {
                let idx = (c as usize) - ('1' as usize);
                self.page_size_choices
                    .get(idx)
                    .and_then(|&n| std::num::NonZeroUsize::new(n))
                    .map(PagerControl::SetPageSize)
            }
            _ => None,
        };

        if let Some(control) = control {
            self.apply(control, now);
        }
    }

    /// Rightmost offset that still shows a column of the widest line.
    fn max_h_scroll(&self) -> u16 {
        let widest = self.text.lines().map(display_width).max().unwrap_or(0);
        u16::try_from(widest.saturating_sub(1)).unwrap_or(u16::MAX)
    }

    fn apply(&mut self, control: PagerControl, now: Instant) {
        match self.pager.handle(control, now) {
            PagerUpdate::Render(text) => self.text = text,
            PagerUpdate::Delete => {
                self.dismissed = true;
                self.should_quit = true;
            }
            // Deleting still works once the controls are gone
            PagerUpdate::Detached if control == PagerControl::Dismiss => {
                self.dismissed = true;
                self.should_quit = true;
            }
            PagerUpdate::Detached => {}
        }
    }

    fn tick(&mut self, now: Instant) {
        self.pager.poll_expiry(now);
    }

    fn draw(&self, frame: &mut Frame, now: Instant) {
        let area = frame.area();
        let chunks = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(area);

        self.draw_title(frame, chunks[0]);
        self.draw_message(frame, chunks[1]);
        self.draw_status(frame, chunks[2], now);

        if self.show_help {
            self.draw_help(frame, area);
        }
    }

    fn draw_title(&self, frame: &mut Frame, area: Rect) {
        let title = format!(
            " zpk: {} | {} rows | page size {} ",
            self.title,
            self.pager.total_rows(),
            self.pager.page_size()
        );
        let para = Paragraph::new(Line::from(vec![Span::styled(
            title,
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )]))
        .style(Style::default().bg(Color::Cyan));
        frame.render_widget(para, area);
    }

    fn draw_message(&self, frame: &mut Frame, area: Rect) {
        let para = Paragraph::new(self.text.as_str()).scroll((0, self.h_scroll));
        frame.render_widget(para, area);
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect, now: Instant) {
        let (left, style) = if self.pager.controls_attached() {
            (
                format!(
                    " {}  | d: delete  q: quit  ?: help ",
                    self.controls_summary()
                ),
                Style::default().fg(Color::Black).bg(Color::DarkGray),
            )
        } else {
            (
                " controls detached (idle) | d: delete  q: quit ".to_string(),
                Style::default().fg(Color::Gray).bg(Color::Black),
            )
        };
        let right = if self.pager.controls_attached() {
            format!("{}s ", self.pager.time_left(now).as_secs())
        } else {
            String::new()
        };

        let padding = (area.width as usize)
            .saturating_sub(left.chars().count() + right.chars().count());
        let status = format!("{}{:pad$}{}", left, "", right, pad = padding);

        let para = Paragraph::new(Line::from(vec![Span::styled(status, style)])).style(style);
        frame.render_widget(para, area);
    }

    fn controls_summary(&self) -> String {
        let mut steps = self.scroll_steps.clone();
        steps.sort_unstable();
        let steps: Vec<String> = steps.iter().map(|s| format!("{:+}", s)).collect();
        let sizes: Vec<String> = self
            .page_size_choices
            .iter()
            .enumerate()
            .take(9)
            .map(|(i, n)| format!("{}={}", i + 1, n))
            .collect();
        format!("scroll {}  rows {}", steps.join(" "), sizes.join(" "))
    }

    fn draw_help(&self, frame: &mut Frame, area: Rect) {
        let help_lines = [
            "",
            "  Scrolling",
            "  ---------",
            "  Up / k             Back one step",
            "  Down / j           Forward one step",
            "  PgUp / PgDn        Back/forward a page step",
            "  [ / ]              Back/forward a jump step",
            "  Shift+PgUp/PgDn    Same as [ / ]",
            "  Left / Right       Pan a wide table",
            "",
            "  Message",
            "  -------",
            "  1..9               Page size from menu",
            "  d / Delete         Delete message",
            "  q / Esc            Quit, keep message",
            "  ?                  Toggle this help",
            "",
        ];
        let help_width: u16 = 46;
        let help_height: u16 = help_lines.len() as u16;

        let x = area.width.saturating_sub(help_width) / 2;
        let y = area.height.saturating_sub(help_height) / 2;
        let popup = Rect::new(
            area.x + x,
            area.y + y,
            help_width.min(area.width),
            help_height.min(area.height),
        );

        let lines: Vec<Line> = help_lines
            .iter()
            .map(|s| Line::from(Span::styled(*s, Style::default().fg(Color::White))))
            .collect();

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Keybindings ")
            .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .style(Style::default().bg(Color::Black));

        frame.render_widget(Clear, popup);
        let para = Paragraph::new(lines).block(block);
        frame.render_widget(para, popup);
    }
}

/// Run the interactive pager until the user quits or deletes the message.
pub fn run(mut view: PagerView) -> Result<Outcome, String> {
    terminal::enable_raw_mode()
        .map_err(|e| format!("failed to enable raw mode: {}", e))?;
    stdout()
        .execute(EnterAlternateScreen)
        .map_err(|e| format!("failed to enter alternate screen: {}", e))?;

    struct Cleanup;
    impl Drop for Cleanup {
        fn drop(&mut self) {
            let _ = stdout().execute(LeaveAlternateScreen);
            let _ = terminal::disable_raw_mode();
        }
    }
    let _cleanup = Cleanup;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal =
        Terminal::new(backend).map_err(|e| format!("failed to create terminal: {}", e))?;

    loop {
        let now = Instant::now();
        view.tick(now);

        terminal
            .draw(|frame| view.draw(frame, now))
            .map_err(|e| format!("draw error: {}", e))?;

        if event::poll(Duration::from_millis(250))
            .map_err(|e| format!("event poll error: {}", e))?
        {
            if let Event::Key(key) =
                event::read().map_err(|e| format!("event read error: {}", e))?
            {
                if key.kind == KeyEventKind::Press {
                    view.handle_key(key, Instant::now());
                }
            }
        }

        if view.should_quit {
            break;
        }
    }

    Ok(view.outcome())
}
