//! FileSystem Actor
//!
//! Watches source directories, `elm.json` files and `elm-watch.json`, and
//! sends debounced changes to the CompilerActor.
//!
//! ```text
//! Watcher → Debouncer (timing, dedup) → Classifier (Elm files) → CompilerMsg
//! ```
//!
//! The watcher is attached before the initial compile starts, so edits made
//! during startup are buffered rather than lost.

use std::path::PathBuf;

use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use super::messages::CompilerMsg;

// Existence correction and Elm file categorization.
mod classifier;
// Timing and per-path deduplication.
mod debouncer;
// Classified events -> CompilerMsg.
mod router;
// Shared fs event types.
mod types;
// Watch root attach/re-attach lifecycle.
mod watch_roots;


pub use watch_roots::WatchRoot;

use classifier::EventClassifier;
use debouncer::Debouncer;
use router::{events_to_messages, log_events};
use watch_roots::WatchRoots;

pub struct FsActor {
    /// Sync bridge from the notify callback
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Must stay alive for events to flow
    watcher: RecommendedWatcher,
    watch_roots: WatchRoots,
    compiler_tx: mpsc::Sender<CompilerMsg>,
    debouncer: Debouncer,
    config_path: PathBuf,
}

impl FsActor {
    pub fn new(
        roots: Vec<WatchRoot>,
        config_path: PathBuf,
        compiler_tx: mpsc::Sender<CompilerMsg>,
    ) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let mut watch_roots = WatchRoots::new(roots);
        watch_roots.attach_existing(&mut watcher)?;

        Ok(Self {
            notify_rx,
            watcher,
            watch_roots,
            compiler_tx,
            debouncer: Debouncer::new(),
            config_path,
        })
    }

    /// Run until the CompilerActor goes away.
    pub async fn run(self) {
        let Self {
            notify_rx,
            mut watcher,
            mut watch_roots,
            compiler_tx,
            mut debouncer,
            config_path,
        } = self;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        loop {
            tokio::select! {
                biased;
                event = async_rx.recv() => match event {
                    Some(event) => debouncer.add_event(&event),
                    None => break,
                },
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    watch_roots.maintain(&mut watcher);
                    if process_changes(&mut debouncer, &compiler_tx, &config_path).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Forward ready changes; `Err(())` once the CompilerActor has shut down.
async fn process_changes(
    debouncer: &mut Debouncer,
    compiler_tx: &mpsc::Sender<CompilerMsg>,
    config_path: &std::path::Path,
) -> Result<(), ()> {
    if compiler_tx.is_closed() {
        return Err(());
    }
    let Some(raw) = debouncer.take_if_ready() else {
        return Ok(());
    };
    let Some(events) = EventClassifier::classify(raw, config_path) else {
        return Ok(());
    };

    log_events(&events);

    for msg in events_to_messages(events) {
        compiler_tx.send(msg).await.map_err(|_| ())?;
    }
    Ok(())
}
