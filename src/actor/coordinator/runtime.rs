use std::time::Duration;

use crossbeam::channel::Receiver;
use tokio::sync::mpsc;

use crate::actor::compiler::CompilerActor;
use crate::actor::fs::FsActor;
use crate::actor::messages::{CompilerMsg, WsMsg};
use crate::actor::ws::WsActor;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Run all actors concurrently until shutdown.
///
/// The compiler actor stops first so it can kill running compiles and flush
/// queued frames; the websocket actor closes connections after that.
pub(super) async fn run_actors(
    fs: FsActor,
    compiler: CompilerActor,
    ws: WsActor,
    compiler_tx: mpsc::Sender<CompilerMsg>,
    ws_tx: mpsc::Sender<WsMsg>,
    shutdown_rx: Option<Receiver<()>>,
) {
    let fs_handle = tokio::spawn(async move { fs.run().await });
    let mut compiler_handle = tokio::spawn(async move { compiler.run().await });
    let ws_handle = tokio::spawn(async move { ws.run().await });

    match shutdown_rx {
        Some(rx) => loop {
            if rx.try_recv().is_ok() {
                crate::debug!("actor"; "shutdown signal received");
                break;
            }
            if compiler_handle.is_finished() {
                break;
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        },
        None => {
            let _ = (&mut compiler_handle).await;
        }
    }

    if !compiler_handle.is_finished() {
        let _ = compiler_tx.send(CompilerMsg::Shutdown).await;
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, compiler_handle).await;
    }

    let _ = ws_tx.send(WsMsg::Shutdown).await;
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, ws_handle).await;

    fs_handle.abort();
}
