use std::io::ErrorKind;

use tungstenite::protocol::Message;

use super::WsActor;
use crate::core::SessionId;

impl WsActor {
    /// Send a frame to one session. Returns `false` when the session is gone.
    ///
    /// A frame the socket cannot take right away stays buffered and is
    /// flushed by the reader thread.
    pub(super) fn send_to(&self, session: SessionId, text: String) -> bool {
        let mut clients = self.clients.lock();
        let Some(index) = clients.iter().position(|c| c.session == session) else {
            crate::debug!("ws"; "{} not connected, dropping frame", session);
            return true;
        };

        match clients[index].ws.send(Message::Text(text.into())) {
            Ok(()) => true,
            Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => true,
            Err(e) => {
                crate::debug!("ws"; "{} disconnected: {}", session, e);
                clients.remove(index);
                false
            }
        }
    }

    /// Close one session.
    pub(super) fn close(&self, session: SessionId) {
        let mut clients = self.clients.lock();
        if let Some(index) = clients.iter().position(|c| c.session == session) {
            let mut client = clients.remove(index);
            let _ = client.ws.close(None);
            let _ = client.ws.flush();
            crate::debug!("ws"; "{} closed", session);
        }
    }

    pub(super) fn close_all(&self) {
        let mut clients = self.clients.lock();
        for mut client in clients.drain(..) {
            let _ = client.ws.close(None);
            let _ = client.ws.flush();
        }
    }
}
