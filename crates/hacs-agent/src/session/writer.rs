//! Single writer per connection
//!
//! All outbound frames go through one task that owns the sink. Two lanes feed
//! it: a control lane for pongs and a result lane for `act_result`s. The
//! control lane is always drained first so a heartbeat reply never queues
//! behind a burst of results.

use std::time::Duration;

use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use hacs_protocol::{encode_message, GatewayMessage};

use super::connector::ConnectionError;

/// Control frames pending at once; only pongs use this lane
const CONTROL_QUEUE_CAPACITY: usize = 16;

/// Handle to the writer task of one connection
pub struct ConnectionWriter {
    control: Option<mpsc::Sender<GatewayMessage>>,
    stop: CancellationToken,
    finish: CancellationToken,
    done: CancellationToken,
    task: JoinHandle<Result<(), ConnectionError>>,
}

impl ConnectionWriter {
    /// Spawn the writer over `sink`.
    ///
    /// Returns the handle and the sender side of the result lane, which holds
    /// up to `results_capacity` pending results.
    pub fn spawn<S>(sink: S, results_capacity: usize) -> (Self, mpsc::Sender<GatewayMessage>)
    where
        S: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        let (results_tx, results_rx) = mpsc::channel(results_capacity.max(1));
        let stop = CancellationToken::new();
        let finish = CancellationToken::new();
        let done = CancellationToken::new();

        let task = tokio::spawn(run(
            sink,
            control_rx,
            results_rx,
            Signals {
                stop: stop.clone(),
                finish: finish.clone(),
                done: done.clone(),
            },
        ));

        let writer = Self {
            control: Some(control_tx),
            stop,
            finish,
            done,
            task,
        };
        (writer, results_tx)
    }

    /// Queue a control frame ahead of any pending results
    pub async fn send_control(&self, msg: GatewayMessage) -> Result<(), ConnectionError> {
        let control = self.control.as_ref().ok_or(ConnectionError::Closed)?;
        control.send(msg).await.map_err(|_| ConnectionError::Closed)
    }

    /// Resolves once the writer task has exited for any reason
    pub async fn closed(&self) {
        self.done.cancelled().await
    }

    /// Stop writing immediately; pending frames are discarded
    pub fn stop_now(&self) {
        self.stop.cancel();
    }

    /// Write what is already queued, close the sink and wait for the task.
    ///
    /// Results queued after this call are not written. If the writer has not
    /// exited within `grace`, the task is aborted and `FlushTimeout` returned.
    pub async fn shutdown(mut self, grace: Duration) -> Result<(), ConnectionError> {
        self.control.take();
        self.finish.cancel();

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!("Writer task failed: {}", e);
                Err(ConnectionError::Closed)
            }
            Err(_) => {
                tracing::warn!("Writer did not flush within {:?}, aborting", grace);
                self.stop.cancel();
                self.task.abort();
                Err(ConnectionError::FlushTimeout(grace))
            }
        }
    }
}

struct Signals {
    /// Exit without writing anything else
    stop: CancellationToken,
    /// Write what is queued, then exit
    finish: CancellationToken,
    /// Set when the task exits
    done: CancellationToken,
}

async fn run<S>(
    mut sink: S,
    mut control: mpsc::Receiver<GatewayMessage>,
    mut results: mpsc::Receiver<GatewayMessage>,
    signals: Signals,
) -> Result<(), ConnectionError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let _done = signals.done.drop_guard();

    let result = loop {
        let msg = tokio::select! {
            biased;

            _ = signals.stop.cancelled() => break Ok(()),
            Some(msg) = control.recv() => msg,
            Some(msg) = results.recv() => msg,
            _ = signals.finish.cancelled() => {
                break flush(&mut sink, &mut control, &mut results).await;
            }
        };

        if let Err(e) = write(&mut sink, &msg).await {
            break Err(ConnectionError::Write(e));
        }
    };

    if let Err(e) = sink.close().await {
        tracing::debug!("Closing connection failed: {}", e);
    }

    result
}

/// Write everything queued on either lane right now, control first
async fn flush<S>(
    sink: &mut S,
    control: &mut mpsc::Receiver<GatewayMessage>,
    results: &mut mpsc::Receiver<GatewayMessage>,
) -> Result<(), ConnectionError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(msg) = control.try_recv().ok().or_else(|| results.try_recv().ok()) {
        write(sink, &msg).await.map_err(ConnectionError::Write)?;
    }
    Ok(())
}

async fn write<S>(sink: &mut S, msg: &GatewayMessage) -> Result<(), WsError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let text = match encode_message(msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to encode {} message: {}", msg.message_type(), e);
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await
}
