//! WebSocket Actor - Bidirectional Communication
//!
//! This actor is responsible for:
//! - Completing handshakes and assigning session ids
//! - Delivering frames to one session at a time
//! - Forwarding client messages and disconnects to the CompilerActor
//!
//! # Architecture
//!
//! ```text
//! CompilerActor --[Send/Close]--> WsActor --[frame]--> page
//!       ^                                                |
//!       +-------[Client/Disconnected]----reader thread---+
//! ```

mod client_io;
mod delivery;

use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tungstenite::WebSocket;

use super::messages::{CompilerMsg, WsMsg};
use crate::core::SessionId;

/// A connected page
struct RegisteredClient {
    session: SessionId,
    ws: WebSocket<TcpStream>,
}

/// WebSocket Actor - owns every client socket
pub struct WsActor {
    /// Channel to receive messages
    rx: mpsc::Receiver<WsMsg>,
    /// Connected clients (shared with the reader thread)
    clients: Arc<Mutex<Vec<RegisteredClient>>>,
    /// Where client messages go
    compiler_tx: mpsc::Sender<CompilerMsg>,
}

impl WsActor {
    pub fn new(rx: mpsc::Receiver<WsMsg>, compiler_tx: mpsc::Sender<CompilerMsg>) -> Self {
        Self {
            rx,
            clients: Arc::new(Mutex::new(Vec::new())),
            compiler_tx,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let clients_for_reader = Arc::clone(&self.clients);
        let compiler_tx = self.compiler_tx.clone();
        std::thread::spawn(move || {
            Self::client_reader_loop(clients_for_reader, compiler_tx);
        });

        while let Some(msg) = self.rx.recv().await {
            match msg {
                WsMsg::AddClient(stream) => self.add_client(stream),
                WsMsg::Send { session, text } => {
                    if !self.send_to(session, text) {
                        let _ = self.compiler_tx.send(CompilerMsg::Disconnected(session)).await;
                    }
                }
                WsMsg::Close(session) => self.close(session),
                WsMsg::Shutdown => {
                    crate::debug!("ws"; "shutting down");
                    self.close_all();
                    break;
                }
            }
        }
    }
}
