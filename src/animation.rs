use crate::loader::{LoadOutcome, LoadQueue, LoadTicket};
use crate::model::{ActionToken, Emotion};
use crate::sprite::{DisplaySize, SheetGrid, SheetKey, SourceRect, SpriteSheet};
use std::{
    borrow::Cow,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle(Emotion),
    ActionPlaying { token: ActionToken, progress: u32 },
}

pub(crate) enum FrameView<'a> {
    Placeholder(Cow<'static, str>),
    Sprite {
        sheet: &'a SpriteSheet,
        src: SourceRect,
    },
}

/// Sprite state machine for one window.
///
/// The emotion layer is the steady state. `set_action` overlays an action
/// sheet for exactly one frame cycle, after which the engine drops back to
/// the latest emotion and asks for its sheet again. Sheet loads go through
/// the window's [`LoadQueue`]; the previously shown sheet stays up until a
/// replacement actually arrives.
pub(crate) struct AnimationEngine {
    grid: SheetGrid,
    display: DisplaySize,
    frame_interval: Duration,
    current_frame: u32,
    current_action: Option<ActionToken>,
    current_emotion: Emotion,
    cycle_progress: u32,
    last_advance: Instant,
    sheet: Option<Arc<SpriteSheet>>,
    wanted: Option<SheetKey>,
    pending: usize,
    last_error: Option<String>,
    loads: LoadQueue,
}

impl AnimationEngine {
    pub(crate) fn new(
        grid: SheetGrid,
        display: DisplaySize,
        frame_interval: Duration,
        loads: LoadQueue,
        now: Instant,
    ) -> Self {
        Self {
            grid,
            display,
            frame_interval,
            current_frame: 0,
            current_action: None,
            current_emotion: Emotion::Neutral,
            cycle_progress: 0,
            last_advance: now,
            sheet: None,
            wanted: None,
            pending: 0,
            last_error: None,
            loads,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        match self.current_action {
            Some(token) => Phase::ActionPlaying {
                token,
                progress: self.cycle_progress,
            },
            None => Phase::Idle(self.current_emotion),
        }
    }

    pub(crate) fn current_frame(&self) -> u32 {
        self.current_frame
    }

    pub(crate) fn current_emotion(&self) -> Emotion {
        self.current_emotion
    }

    pub(crate) fn display(&self) -> DisplaySize {
        self.display
    }

    pub(crate) fn shown_sheet(&self) -> Option<SheetKey> {
        self.sheet.as_ref().map(|s| s.key)
    }

    pub(crate) fn set_action(&mut self, token: ActionToken) -> LoadTicket {
        debug!(action = %token, "setting action");
        self.current_action = Some(token);
        self.current_frame = 0;
        self.cycle_progress = 0;
        self.request(SheetKey::Action(token))
    }

    /// Switches the steady-state emotion. While an action plays nothing is
    /// loaded; the value is only remembered for when the action ends.
    pub(crate) fn set_emotion(&mut self, emotion: Emotion) -> LoadTicket {
        if self.current_action.is_some() {
            debug!(%emotion, "action animation in progress, deferring emotion");
            self.current_emotion = emotion;
            return LoadTicket::settled(Ok(()));
        }
        if self.wanted == Some(SheetKey::Emotion(emotion)) {
            return LoadTicket::settled(Ok(()));
        }
        debug!(%emotion, "setting emotion");
        self.show_emotion(emotion)
    }

    fn show_emotion(&mut self, emotion: Emotion) -> LoadTicket {
        self.current_emotion = emotion;
        self.current_frame = 0;
        self.request(SheetKey::Emotion(emotion))
    }

    fn request(&mut self, key: SheetKey) -> LoadTicket {
        self.wanted = Some(key);
        self.pending += 1;
        self.loads.request(key)
    }

    /// Steps one frame if a full frame interval has passed since the last
    /// step. Returns whether the frame changed.
    ///
    /// Steps land on a fixed schedule, so a tick that arrives a little late
    /// does not push the next one back. After a stall of two intervals or
    /// more the schedule restarts from `now`.
    pub(crate) fn advance(&mut self, now: Instant) -> bool {
        let since = now.saturating_duration_since(self.last_advance);
        if since < self.frame_interval {
            return false;
        }
        self.last_advance = if since >= self.frame_interval * 2 {
            now
        } else {
            self.last_advance + self.frame_interval
        };
        self.current_frame = (self.current_frame + 1) % self.grid.total_frames;

        if let Some(token) = self.current_action {
            self.cycle_progress += 1;
            if self.cycle_progress >= self.grid.total_frames {
                debug!(action = %token, emotion = %self.current_emotion, "action cycle complete");
                self.current_action = None;
                self.cycle_progress = 0;
                // outcome is logged in apply_load
                let _ = self.show_emotion(self.current_emotion);
            }
        }
        true
    }

    /// Installs a settled load. Failures keep whatever sheet is already up.
    pub(crate) fn apply_load(&mut self, outcome: LoadOutcome) {
        self.pending = self.pending.saturating_sub(1);
        match &outcome.result {
            Ok(sheet) => {
                self.sheet = Some(Arc::clone(sheet));
                self.last_error = None;
            }
            Err(e) => {
                warn!(sheet = %outcome.key, error = %e, "failed to load sprite sheet");
                if self.wanted == Some(outcome.key) {
                    self.wanted = None;
                }
                self.last_error = Some(e.to_string());
            }
        }
        outcome.finish();
    }

    pub(crate) fn frame_view(&self) -> FrameView<'_> {
        match &self.sheet {
            Some(sheet) => FrameView::Sprite {
                sheet,
                src: self.grid.source_rect(self.current_frame),
            },
            None => FrameView::Placeholder(match &self.last_error {
                Some(e) => Cow::Owned(format!("Error loading sprite: {e}")),
                None if self.pending > 0 => Cow::Borrowed("Loading sprite..."),
                None => Cow::Borrowed("Initializing..."),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::testing::FakeSource;
    use crate::sprite::SpriteError;
    use tokio::sync::mpsc;

    const FRAME: Duration = Duration::from_millis(200);
    const EATING: SheetKey = SheetKey::Action(ActionToken::Eating);
    const PLAYING: SheetKey = SheetKey::Action(ActionToken::Playing);

    fn engine(src: FakeSource) -> (AnimationEngine, mpsc::UnboundedReceiver<LoadOutcome>, Instant) {
        let (loads, done) = LoadQueue::spawn(src, Duration::from_secs(5));
        let start = Instant::now();
        let display = DisplaySize {
            width: 96,
            height: 96,
        };
        let e = AnimationEngine::new(SheetGrid::default(), display, FRAME, loads, start);
        (e, done, start)
    }

    async fn pump(e: &mut AnimationEngine, done: &mut mpsc::UnboundedReceiver<LoadOutcome>) -> SheetKey {
        let outcome = done.recv().await.unwrap();
        let key = outcome.key;
        e.apply_load(outcome);
        key
    }

    #[tokio::test(start_paused = true)]
    async fn starts_idle_and_neutral_with_a_placeholder() {
        let (e, _done, _) = engine(FakeSource::default());
        assert_eq!(e.phase(), Phase::Idle(Emotion::Neutral));
        assert!(matches!(e.frame_view(), FrameView::Placeholder(m) if m == "Initializing..."));
    }

    #[tokio::test(start_paused = true)]
    async fn frames_only_advance_once_the_interval_passes() {
        let (mut e, _done, start) = engine(FakeSource::default());
        assert!(!e.advance(start + Duration::from_millis(150)));
        assert_eq!(e.current_frame(), 0);
        assert!(e.advance(start + FRAME));
        assert_eq!(e.current_frame(), 1);
        assert!(!e.advance(start + FRAME + Duration::from_millis(199)));
    }

    #[tokio::test(start_paused = true)]
    async fn late_ticks_keep_the_frame_rate() {
        let (mut e, _done, start) = engine(FakeSource::default());
        let late_ms = [3u64, 1, 4, 0, 2, 5, 1, 0, 3, 2];
        let mut stepped = 0;
        for (k, late) in (1..).zip(late_ms) {
            if e.advance(start + FRAME * k + Duration::from_millis(late)) {
                stepped += 1;
            }
        }
        assert_eq!(stepped, 10);
        assert_eq!(e.current_frame(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn long_stall_restarts_the_schedule() {
        let (mut e, _done, start) = engine(FakeSource::default());
        let resumed = start + Duration::from_secs(3);
        assert!(e.advance(resumed));
        assert_eq!(e.current_frame(), 1);
        assert!(!e.advance(resumed + Duration::from_millis(150)));
        assert!(e.advance(resumed + FRAME));
    }

    #[tokio::test(start_paused = true)]
    async fn frame_index_wraps_after_a_full_cycle() {
        let (mut e, _done, start) = engine(FakeSource::default());
        for k in 1..=29u32 {
            assert!(e.advance(start + FRAME * k));
        }
        assert_eq!(e.current_frame(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn action_plays_for_exactly_one_cycle() {
        let (mut e, mut done, start) = engine(FakeSource::default());
        let _ = e.set_action(ActionToken::Playing);
        assert_eq!(
            e.phase(),
            Phase::ActionPlaying {
                token: ActionToken::Playing,
                progress: 0
            }
        );
        assert_eq!(pump(&mut e, &mut done).await, PLAYING);

        for k in 1..29u32 {
            e.advance(start + FRAME * k);
            assert_eq!(
                e.phase(),
                Phase::ActionPlaying {
                    token: ActionToken::Playing,
                    progress: k
                }
            );
        }
        e.advance(start + FRAME * 29);
        assert_eq!(e.phase(), Phase::Idle(Emotion::Neutral));
        assert_eq!(e.current_frame(), 0);

        // the emotion sheet is asked for again on the way out
        assert_eq!(pump(&mut e, &mut done).await, SheetKey::Emotion(Emotion::Neutral));
        assert_eq!(e.shown_sheet(), Some(SheetKey::Emotion(Emotion::Neutral)));
    }

    #[tokio::test(start_paused = true)]
    async fn emotion_changes_wait_for_the_action_to_finish() {
        let (mut e, mut done, start) = engine(FakeSource::default());
        let _ = e.set_action(ActionToken::Eating);
        assert!(e.set_emotion(Emotion::Happy).wait().await.is_ok());
        assert!(matches!(e.phase(), Phase::ActionPlaying { .. }));

        assert_eq!(pump(&mut e, &mut done).await, EATING);
        assert!(done.try_recv().is_err());

        for k in 1..=29u32 {
            e.advance(start + FRAME * k);
        }
        assert_eq!(e.phase(), Phase::Idle(Emotion::Happy));
        assert_eq!(pump(&mut e, &mut done).await, SheetKey::Emotion(Emotion::Happy));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_emotion_does_not_reload() {
        let src = FakeSource::default();
        let (mut e, mut done, _) = engine(src.clone());
        let first = e.set_emotion(Emotion::Sad);
        let _ = e.set_emotion(Emotion::Sad);
        pump(&mut e, &mut done).await;
        assert!(first.wait().await.is_ok());
        assert!(e.set_emotion(Emotion::Sad).wait().await.is_ok());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(done.try_recv().is_err());
        assert_eq!(src.events(), vec!["start:sad", "end:sad"]);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_actions_load_in_arrival_order() {
        let src = FakeSource::default()
            .slow(EATING, Duration::from_millis(900))
            .slow(PLAYING, Duration::from_millis(20));
        let (mut e, mut done, _) = engine(src.clone());

        let first = e.set_action(ActionToken::Eating);
        let second = e.set_action(ActionToken::Playing);
        assert_eq!(e.phase(), Phase::ActionPlaying { token: ActionToken::Playing, progress: 0 });

        assert_eq!(pump(&mut e, &mut done).await, EATING);
        assert_eq!(e.shown_sheet(), Some(EATING));
        assert!(first.wait().await.is_ok());

        assert_eq!(pump(&mut e, &mut done).await, PLAYING);
        assert!(second.wait().await.is_ok());
        assert_eq!(e.shown_sheet(), Some(PLAYING));

        assert_eq!(
            src.events(),
            vec!["start:eating", "end:eating", "start:playing", "end:playing"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_load_keeps_the_previous_sheet() {
        let src = FakeSource::default().slow(EATING, Duration::from_secs(60));
        let (mut e, mut done, start) = engine(src);

        let _ = e.set_emotion(Emotion::Happy);
        pump(&mut e, &mut done).await;
        assert_eq!(e.shown_sheet(), Some(SheetKey::Emotion(Emotion::Happy)));

        let ticket = e.set_action(ActionToken::Eating);
        assert_eq!(pump(&mut e, &mut done).await, EATING);
        assert!(matches!(ticket.wait().await, Err(SpriteError::Timeout { .. })));
        assert_eq!(e.shown_sheet(), Some(SheetKey::Emotion(Emotion::Happy)));

        // next scheduled frame still renders
        assert!(e.advance(start + FRAME));
        match e.frame_view() {
            FrameView::Sprite { sheet, src } => {
                assert_eq!(sheet.key, SheetKey::Emotion(Emotion::Happy));
                assert!(src.x > 0.0);
            }
            FrameView::Placeholder(_) => panic!("lost the previous sheet"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_before_any_sheet_shows_the_error() {
        let src = FakeSource::default().broken(SheetKey::Emotion(Emotion::Neutral));
        let (mut e, mut done, start) = engine(src);

        let _ = e.set_emotion(Emotion::Neutral);
        assert!(matches!(e.frame_view(), FrameView::Placeholder(m) if m == "Loading sprite..."));
        pump(&mut e, &mut done).await;

        assert!(e.advance(start + FRAME));
        match e.frame_view() {
            FrameView::Placeholder(m) => assert!(m.starts_with("Error loading sprite:")),
            FrameView::Sprite { .. } => panic!("nothing should have loaded"),
        }

        // a failed emotion can be asked for again
        let _ = e.set_emotion(Emotion::Neutral);
        assert!(matches!(e.frame_view(), FrameView::Placeholder(_)));
        assert!(done.recv().await.is_some());
    }
}
