use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use crate::actor::messages::CompilerMsg;
use crate::core::SessionId;
use crate::reload::ClientMessage;

use super::{RegisteredClient, WsActor};

const READ_POLL: Duration = Duration::from_millis(50);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of draining one client's socket.
enum ReadState {
    Open,
    Closed,
}

impl WsActor {
    /// Complete the handshake and register the client under a fresh session.
    pub(super) fn add_client(&self, stream: TcpStream) {
        let _ = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT));

        match tungstenite::accept(stream) {
            Ok(ws) => {
                // Reads are polled from now on
                let _ = ws.get_ref().set_read_timeout(None);
                let _ = ws.get_ref().set_nonblocking(true);

                let session = SessionId::next();
                let mut clients = self.clients.lock();
                crate::debug!("ws"; "{} connected (total: {})", session, clients.len() + 1);
                clients.push(RegisteredClient { session, ws });
            }
            Err(e) => {
                crate::log!("ws"; "handshake failed: {}", e);
            }
        }
    }

    /// Background thread polling client sockets.
    ///
    /// Events are collected under the lock and forwarded after it is
    /// released.
    pub(super) fn client_reader_loop(
        clients: Arc<Mutex<Vec<RegisteredClient>>>,
        compiler_tx: mpsc::Sender<CompilerMsg>,
    ) {
        loop {
            std::thread::sleep(READ_POLL);

            // Actor dropped its handle
            if Arc::strong_count(&clients) == 1 || crate::core::is_shutdown() {
                break;
            }

            let mut events = Vec::new();
            {
                let mut clients_guard = clients.lock();
                clients_guard.retain_mut(|client| {
                    // Push out frames a previous send left buffered
                    let _ = client.ws.flush();
                    match Self::drain(client.session, &mut client.ws, &mut events) {
                        ReadState::Open => true,
                        ReadState::Closed => {
                            crate::debug!("ws"; "{} disconnected", client.session);
                            events.push(CompilerMsg::Disconnected(client.session));
                            false
                        }
                    }
                });
            }

            for event in events {
                if compiler_tx.blocking_send(event).is_err() {
                    return;
                }
            }
        }
    }

    /// Read every frame currently available.
    fn drain(
        session: SessionId,
        ws: &mut WebSocket<TcpStream>,
        events: &mut Vec<CompilerMsg>,
    ) -> ReadState {
        loop {
            match ws.read() {
                Ok(Message::Text(text)) => match ClientMessage::from_json(&text) {
                    Some(message) => events.push(CompilerMsg::Client { session, message }),
                    None => crate::debug!("ws"; "{} sent unknown message: {}", session, text.as_str()),
                },
                Ok(Message::Close(_)) => return ReadState::Closed,
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => {
                    return ReadState::Open;
                }
                Err(_) => return ReadState::Closed,
            }
        }
    }
}
