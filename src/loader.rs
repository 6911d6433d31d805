use crate::sprite::{SheetKey, SheetSource, SpriteError, SpriteSheet};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info};

struct LoadRequest {
    key: SheetKey,
    reply: oneshot::Sender<Result<(), SpriteError>>,
}

/// A settled load, handed back to the owning window so it can swap the
/// sheet in before the caller's ticket resolves.
pub(crate) struct LoadOutcome {
    pub(crate) key: SheetKey,
    pub(crate) result: Result<Arc<SpriteSheet>, SpriteError>,
    reply: oneshot::Sender<Result<(), SpriteError>>,
}

impl LoadOutcome {
    /// Hands the load's result to whoever holds the ticket.
    pub(crate) fn finish(self) {
        let _ = self.reply.send(self.result.map(|_| ()));
    }
}

/// Resolves once the requested sheet is on screen or the load failed.
/// Dropping it is fine; failures are logged by the engine either way.
pub(crate) struct LoadTicket {
    rx: oneshot::Receiver<Result<(), SpriteError>>,
}

impl LoadTicket {
    pub(crate) fn settled(result: Result<(), SpriteError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    pub(crate) async fn wait(self) -> Result<(), SpriteError> {
        self.rx.await.unwrap_or(Err(SpriteError::LoaderClosed))
    }
}

/// Handle to a window's sheet loader task. Requests are serviced strictly
/// one at a time in arrival order; the task stops when this is dropped.
pub(crate) struct LoadQueue {
    tx: mpsc::UnboundedSender<LoadRequest>,
    task: JoinHandle<()>,
}

impl LoadQueue {
    pub(crate) fn spawn<S: SheetSource>(
        source: S,
        timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<LoadOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_loader(source, timeout, rx, done_tx));
        (Self { tx, task }, done_rx)
    }

    pub(crate) fn request(&self, key: SheetKey) -> LoadTicket {
        let (reply, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(req)) = self.tx.send(LoadRequest { key, reply }) {
            let _ = req.reply.send(Err(SpriteError::LoaderClosed));
        }
        LoadTicket { rx }
    }
}

impl Drop for LoadQueue {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_loader<S: SheetSource>(
    source: S,
    timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<LoadRequest>,
    done: mpsc::UnboundedSender<LoadOutcome>,
) {
    while let Some(LoadRequest { key, reply }) = rx.recv().await {
        if !rx.is_empty() {
            debug!(sheet = %key, queued = rx.len(), "sprite loads queued behind this one");
        }
        debug!(sheet = %key, "loading sprite sheet");
        let result = match tokio::time::timeout(timeout, source.fetch(key)).await {
            Ok(Ok(sheet)) => {
                info!(
                    sheet = %key,
                    width = sheet.image.width(),
                    height = sheet.image.height(),
                    "sprite sheet loaded"
                );
                Ok(Arc::new(sheet))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SpriteError::Timeout {
                sheet: key,
                after: timeout,
            }),
        };
        if done.send(LoadOutcome { key, result, reply }).is_err() {
            break;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    /// In-memory sheets with per-sheet delays and failures. Every fetch
    /// records `start:<sheet>` and `end:<sheet>` so tests can check ordering.
    #[derive(Clone, Default)]
    pub(crate) struct FakeSource {
        pub(crate) delays: HashMap<SheetKey, Duration>,
        pub(crate) broken: Vec<SheetKey>,
        pub(crate) log: Arc<Mutex<Vec<String>>>,
    }

    impl FakeSource {
        pub(crate) fn slow(mut self, key: SheetKey, delay: Duration) -> Self {
            self.delays.insert(key, delay);
            self
        }

        pub(crate) fn broken(mut self, key: SheetKey) -> Self {
            self.broken.push(key);
            self
        }

        pub(crate) fn events(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl SheetSource for FakeSource {
        fn fetch(
            &self,
            key: SheetKey,
        ) -> impl std::future::Future<Output = Result<SpriteSheet, SpriteError>> + Send {
            let delay = self.delays.get(&key).copied().unwrap_or(Duration::from_millis(10));
            let broken = self.broken.contains(&key);
            let log = Arc::clone(&self.log);
            async move {
                log.lock().unwrap().push(format!("start:{key}"));
                tokio::time::sleep(delay).await;
                log.lock().unwrap().push(format!("end:{key}"));
                if broken {
                    return Err(SpriteError::Decode {
                        sheet: key,
                        reason: "bad pixels".to_string(),
                    });
                }
                Ok(SpriteSheet {
                    key,
                    image: image::RgbaImage::from_pixel(12, 10, image::Rgba([1, 2, 3, 255])),
                })
            }
        }
    }
}
