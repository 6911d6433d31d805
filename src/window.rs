use crate::animation::AnimationEngine;
use crate::loader::{LoadOutcome, LoadQueue};
use crate::model::{ActionToken, Metrics};
use crate::sprite::{DisplaySize, SheetGrid, SheetSource};
use crate::sync::{SyncHub, SyncMessage, WindowId};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

pub(crate) struct WindowConfig {
    pub(crate) id: WindowId,
    pub(crate) display: DisplaySize,
    pub(crate) grid: SheetGrid,
    pub(crate) frame_interval: Duration,
    pub(crate) load_timeout: Duration,
}

/// One pet view. Main and PiP are the same type with a different id and
/// display size.
pub(crate) struct PetWindow {
    id: WindowId,
    engine: AnimationEngine,
    completions: mpsc::UnboundedReceiver<LoadOutcome>,
    inbox: mpsc::UnboundedReceiver<SyncMessage>,
    metrics: Metrics,
}

impl PetWindow {
    pub(crate) fn open<S: SheetSource>(
        cfg: WindowConfig,
        source: S,
        hub: &SyncHub,
        metrics: Metrics,
        now: Instant,
    ) -> Self {
        let (loads, completions) = LoadQueue::spawn(source, cfg.load_timeout);
        let engine = AnimationEngine::new(cfg.grid, cfg.display, cfg.frame_interval, loads, now);
        let mut w = Self {
            id: cfg.id,
            engine,
            completions,
            inbox: hub.register(cfg.id),
            metrics,
        };
        let _ = w.engine.set_emotion(metrics.emotion);
        w
    }

    pub(crate) fn engine(&self) -> &AnimationEngine {
        &self.engine
    }

    pub(crate) fn metrics(&self) -> Metrics {
        self.metrics
    }

    /// Fresh metrics from the vitals model. Only the window hosting the
    /// model calls this; peers hear about it through the hub.
    pub(crate) fn on_metrics(&mut self, metrics: Metrics, hub: &SyncHub) {
        self.metrics = metrics;
        let _ = self.engine.set_emotion(metrics.emotion);
        hub.publish(self.id, SyncMessage::metrics(metrics));
    }

    /// An action accepted on behalf of this window.
    pub(crate) fn on_action(&mut self, token: ActionToken, metrics: Metrics, hub: &SyncHub) {
        self.metrics = metrics;
        let _ = self.engine.set_action(token);
        hub.publish(self.id, SyncMessage::action(token, metrics));
    }

    /// State from a peer. Applied as-is; vitals are never recomputed here.
    pub(crate) fn apply_sync(&mut self, msg: SyncMessage) {
        debug!(window = %self.id, ?msg, "applying peer state");
        if let Some(token) = msg.action {
            let _ = self.engine.set_action(token);
        }
        if let Some(metrics) = msg.metrics {
            self.metrics = metrics;
        }
        if let Some(emotion) = msg.emotion {
            let _ = self.engine.set_emotion(emotion);
        }
    }

    /// Drains finished loads and peer messages without waiting. Returns
    /// whether anything was applied.
    pub(crate) fn pump(&mut self) -> bool {
        let mut changed = false;
        while let Ok(outcome) = self.completions.try_recv() {
            self.engine.apply_load(outcome);
            debug!(window = %self.id, sheet = ?self.engine.shown_sheet(), "load settled");
            changed = true;
        }
        while let Ok(msg) = self.inbox.try_recv() {
            self.apply_sync(msg);
            changed = true;
        }
        changed
    }

    pub(crate) fn advance(&mut self, now: Instant) -> bool {
        self.engine.advance(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Phase;
    use crate::loader::testing::FakeSource;
    use crate::model::Emotion;
    use crate::sprite::SheetKey;

    const FRAME: Duration = Duration::from_millis(200);

    fn open(id: WindowId, hub: &SyncHub, src: FakeSource, now: Instant) -> PetWindow {
        let size = match id {
            WindowId::Main => 96,
            WindowId::Pip => 48,
        };
        let cfg = WindowConfig {
            id,
            display: DisplaySize {
                width: size,
                height: size,
            },
            grid: SheetGrid::default(),
            frame_interval: FRAME,
            load_timeout: Duration::from_secs(5),
        };
        PetWindow::open(cfg, src, hub, Metrics::default(), now)
    }

    // Two rounds: a peer message applied on the first pump may queue a load.
    async fn settle(w: &mut PetWindow) {
        for _ in 0..2 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            w.pump();
        }
    }

    fn with_happiness(happiness: f64) -> Metrics {
        Metrics {
            happiness,
            emotion: Emotion::from_happiness(happiness),
            ..Metrics::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_on_the_current_emotion() {
        let hub = SyncHub::default();
        let mut w = open(WindowId::Main, &hub, FakeSource::default(), Instant::now());
        settle(&mut w).await;
        assert_eq!(w.engine().shown_sheet(), Some(SheetKey::Emotion(Emotion::Neutral)));
        assert_eq!(w.engine().display().width, 96);
    }

    #[tokio::test(start_paused = true)]
    async fn action_on_main_plays_on_pip_too() {
        let hub = SyncHub::default();
        let now = Instant::now();
        let mut main = open(WindowId::Main, &hub, FakeSource::default(), now);
        let mut pip = open(WindowId::Pip, &hub, FakeSource::default(), now);

        let m = with_happiness(60.0);
        main.on_action(ActionToken::Eating, m, &hub);
        settle(&mut main).await;
        settle(&mut pip).await;

        let playing = Phase::ActionPlaying {
            token: ActionToken::Eating,
            progress: 0,
        };
        assert_eq!(main.engine().phase(), playing);
        assert_eq!(pip.engine().phase(), playing);
        assert_eq!(pip.metrics(), m);
        assert_eq!(pip.engine().shown_sheet(), Some(SheetKey::Action(ActionToken::Eating)));
        // no echo back to main
        assert!(!main.pump());
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_update_emotion_on_both_windows() {
        let hub = SyncHub::default();
        let now = Instant::now();
        let mut main = open(WindowId::Main, &hub, FakeSource::default(), now);
        let mut pip = open(WindowId::Pip, &hub, FakeSource::default(), now);
        settle(&mut main).await;
        settle(&mut pip).await;

        main.on_metrics(with_happiness(90.0), &hub);
        settle(&mut main).await;
        settle(&mut pip).await;

        assert_eq!(main.engine().phase(), Phase::Idle(Emotion::Happy));
        assert_eq!(pip.engine().phase(), Phase::Idle(Emotion::Happy));
        assert_eq!(pip.engine().shown_sheet(), Some(SheetKey::Emotion(Emotion::Happy)));
        assert_eq!(pip.metrics().happiness, 90.0);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_emotion_waits_behind_a_peer_action() {
        let hub = SyncHub::default();
        let now = Instant::now();
        let mut pip = open(WindowId::Pip, &hub, FakeSource::default(), now);
        settle(&mut pip).await;

        let m = with_happiness(10.0);
        pip.apply_sync(SyncMessage {
            action: Some(ActionToken::Cleaning),
            metrics: Some(m),
            emotion: Some(Emotion::Sad),
        });
        settle(&mut pip).await;
        assert!(matches!(pip.engine().phase(), Phase::ActionPlaying { .. }));
        assert_eq!(pip.engine().current_emotion(), Emotion::Sad);

        for k in 1..=29u32 {
            pip.advance(now + FRAME * k);
        }
        settle(&mut pip).await;
        assert_eq!(pip.engine().phase(), Phase::Idle(Emotion::Sad));
        assert_eq!(pip.engine().shown_sheet(), Some(SheetKey::Emotion(Emotion::Sad)));
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_only_message_leaves_the_animation_alone() {
        let hub = SyncHub::default();
        let mut pip = open(WindowId::Pip, &hub, FakeSource::default(), Instant::now());
        settle(&mut pip).await;

        let m = with_happiness(45.0);
        pip.apply_sync(SyncMessage {
            metrics: Some(m),
            ..SyncMessage::default()
        });
        assert_eq!(pip.metrics(), m);
        assert_eq!(pip.engine().phase(), Phase::Idle(Emotion::Neutral));
        settle(&mut pip).await;
        assert!(!pip.pump());
    }
}
