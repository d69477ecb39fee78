//! Framed channel between the client and the server after the handshake.
//!
//! Sending and receiving run on their own tasks. The render loop hands
//! outbound judgments to a bounded queue and drains inbound ones without
//! blocking, so a slow socket never stalls a frame.

use crate::game::JudgmentEvent;
use log::{debug, info, warn};
use shared::protocol::{read_frame, write_frame};
use shared::{Judgment, JudgmentMessage, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::task::JoinHandle;

pub const OUTBOUND_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Judgment(JudgmentEvent),
    /// Ends the send task once everything queued before it is written.
    Shutdown,
}

pub struct Connection {
    outbound_tx: mpsc::Sender<Outbound>,
    inbound_rx: mpsc::UnboundedReceiver<(usize, Judgment)>,
    send_task: JoinHandle<()>,
    recv_task: JoinHandle<()>,
    connected: bool,
}

impl Connection {
    /// Spawns the send and receive tasks for `reader`/`writer` on `runtime`.
    pub fn spawn<R, W>(runtime: &Handle, reader: R, writer: W, name: String) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let send_task = runtime.spawn(send_loop(writer, outbound_rx, name));
        let recv_task = runtime.spawn(receive_loop(reader, inbound_tx));

        Self {
            outbound_tx,
            inbound_rx,
            send_task,
            recv_task,
            connected: true,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Queues a local judgment for the server. Never blocks.
    pub fn send(&mut self, event: JudgmentEvent) {
        match self.outbound_tx.try_send(Outbound::Judgment(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full, dropping judgment for note {}", event.note_id)
            }
            Err(TrySendError::Closed(_)) => self.connected = false,
        }
    }

    /// Judgments received since the last call.
    pub fn drain(&mut self) -> Vec<(usize, Judgment)> {
        let mut received = Vec::new();
        loop {
            match self.inbound_rx.try_recv() {
                Ok(judgment) => received.push(judgment),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.connected {
                        info!("Server connection closed");
                    }
                    self.connected = false;
                    break;
                }
            }
        }
        received
    }

    /// Flushes queued judgments, closes the write half and stops receiving.
    pub async fn shutdown(self) {
        if self.outbound_tx.send(Outbound::Shutdown).await.is_ok() {
            if let Err(e) = self.send_task.await {
                warn!("Send task failed: {}", e);
            }
        }
        self.recv_task.abort();
    }
}

async fn send_loop<W>(mut writer: W, mut outbound_rx: mpsc::Receiver<Outbound>, name: String)
where
    W: AsyncWrite + Unpin,
{
    while let Some(outbound) = outbound_rx.recv().await {
        let event = match outbound {
            Outbound::Judgment(event) => event,
            Outbound::Shutdown => break,
        };

        let payload = JudgmentMessage::new(name.as_str(), event.note_id, event.judgment).encode();
        debug!("Sending {:?}", payload);
        if let Err(e) = write_frame(&mut writer, &payload).await {
            warn!("Could not send judgment: {}", e);
            break;
        }
    }

    let _ = writer.shutdown().await;
}

async fn receive_loop<R>(mut reader: R, inbound_tx: mpsc::UnboundedSender<(usize, Judgment)>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let payload = match read_frame(&mut reader).await {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(e) => {
                warn!("Lost server connection: {}", e);
                break;
            }
        };

        match JudgmentMessage::parse(&payload) {
            Ok(message) => {
                debug!("{} judged note {} {}", message.name, message.note_id, message.judgment);
                if inbound_tx.send((message.note_id, message.judgment)).is_err() {
                    break;
                }
            }
            Err(ProtocolError::MalformedMessage(raw)) => {
                warn!("Skipping malformed message from server: {:?}", raw)
            }
            Err(e) => warn!("Skipping message from server: {}", e),
        }
    }
}
