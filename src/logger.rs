//! Terminal output.
//!
//! - `log!` / `debug!`: one line with a colored `[module]` prefix
//! - `status_*`: the watch-mode result block, replaced by the next result
//! - [`ProgressLine`]: `make` counters on a single line
//!
//! ```ignore
//! log!("hot"; "websocket listening on ws://127.0.0.1:{}", port);
//! debug!("deps"; "graph: {} targets", n);
//! status_error("main: compile error", &rendered_report);
//! ```

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    io::{Write, stdout},
    sync::LazyLock,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::SystemTime,
};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set while a [`ProgressLine`] owns the current terminal line.
static PINNED: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Like `log!`, printed only with `--verbose`.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

/// Print one prefixed line. A pinned progress line is overwritten and
/// redrawn by its next update.
pub fn log(module: &str, message: &str) {
    let prefix = prefix(module);
    let mut out = stdout().lock();
    if PINNED.load(Ordering::SeqCst) {
        execute!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
    } else {
        execute!(out, Clear(ClearType::UntilNewLine)).ok();
    }
    writeln!(out, "{prefix} {message}").ok();
    out.flush().ok();
}

fn prefix(module: &str) -> String {
    let tag = format!("[{module}]");
    match module {
        "hot" | "ws" => tag.bright_blue().bold().to_string(),
        "watch" => tag.bright_green().bold().to_string(),
        "make" => tag.bright_magenta().bold().to_string(),
        "error" => tag.bright_red().bold().to_string(),
        _ => tag.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Watch status
// ============================================================================

fn clock(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", (secs / 3600) % 24, (secs / 60) % 60, secs % 60)
}

fn now() -> String {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    clock(secs)
}

/// Timestamped result block that the next result overwrites.
///
/// A block is detached when several targets failed in one round, so each
/// error stays readable.
pub struct WatchStatus {
    /// Height of the block on screen
    last_lines: usize,
}

static WATCH_STATUS: LazyLock<Mutex<WatchStatus>> = LazyLock::new(|| Mutex::new(WatchStatus::new()));

impl WatchStatus {
    pub const fn new() -> Self {
        Self { last_lines: 0 }
    }

    pub fn success(&mut self, message: &str) {
        self.show(&"✓".green().to_string(), message);
    }

    pub fn error(&mut self, summary: &str, detail: &str) {
        if detail.is_empty() {
            self.show(&"✗".red().to_string(), summary);
        } else {
            self.show(&"✗".red().to_string(), &format!("{summary}\n{detail}"));
        }
    }

    /// Keep the current block; the next one is printed below it.
    pub fn detach(&mut self) {
        self.last_lines = 0;
    }

    #[allow(clippy::cast_possible_truncation)]
    fn show(&mut self, symbol: &str, message: &str) {
        let mut out = stdout().lock();
        if self.last_lines > 0 {
            execute!(
                out,
                cursor::MoveUp(self.last_lines as u16),
                Clear(ClearType::FromCursorDown)
            )
            .ok();
        }
        let stamp = format!("[{}]", now()).dimmed().to_string();
        writeln!(out, "{stamp} {symbol} {message}").ok();
        out.flush().ok();
        self.last_lines = message.lines().count().max(1);
    }
}

pub fn status_success(message: &str) {
    WATCH_STATUS.lock().success(message);
}

pub fn status_error(summary: &str, detail: &str) {
    WATCH_STATUS.lock().error(summary, detail);
}

pub fn status_detach() {
    WATCH_STATUS.lock().detach();
}

// ============================================================================
// Progress line
// ============================================================================

/// `[make] compiled(2/5) failed(1/5)`, redrawn in place.
///
/// Counters with a zero total are not shown.
pub struct ProgressLine {
    module: &'static str,
    counters: Vec<(&'static str, usize, AtomicUsize)>,
    redraw: Mutex<()>,
    finished: bool,
}

impl ProgressLine {
    pub fn new(module: &'static str, totals: &[(&'static str, usize)]) -> Self {
        PINNED.store(true, Ordering::SeqCst);
        let progress = Self {
            module,
            counters: totals
                .iter()
                .filter(|(_, total)| *total > 0)
                .map(|&(name, total)| (name, total, AtomicUsize::new(0)))
                .collect(),
            redraw: Mutex::new(()),
            finished: false,
        };
        progress.draw(false);
        progress
    }

    /// Bump a counter. The redraw is skipped while another one is in progress.
    pub fn inc(&self, name: &str) {
        let Some((_, _, count)) = self.counters.iter().find(|(n, _, _)| *n == name) else {
            return;
        };
        count.fetch_add(1, Ordering::Relaxed);
        if let Some(_guard) = self.redraw.try_lock() {
            self.draw(false);
        }
    }

    fn render(&self) -> String {
        self.counters
            .iter()
            .map(|(name, total, count)| format!("{name}({}/{total})", count.load(Ordering::Relaxed)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn draw(&self, newline: bool) {
        let line = format!("{} {}", prefix(self.module), self.render());
        let mut out = stdout().lock();
        execute!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
        if newline {
            writeln!(out, "{line}").ok();
        } else {
            write!(out, "{line}").ok();
        }
        out.flush().ok();
    }

    /// Leave the final counts on screen.
    pub fn finish(mut self) {
        {
            let _guard = self.redraw.lock();
            PINNED.store(false, Ordering::SeqCst);
            self.draw(true);
        }
        self.finished = true;
    }
}

impl Drop for ProgressLine {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        PINNED.store(false, Ordering::SeqCst);
        let mut out = stdout().lock();
        execute!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
        out.flush().ok();
    }
}
