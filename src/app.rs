use crate::actions::ActionController;
use crate::clock::{Clock, SystemClock};
use crate::config::{load_settings, save_settings_atomic, Cli, Paths, Settings};
use crate::input::{collect_input_nonblocking, map_event, Command};
use crate::model::{percent, Metrics};
use crate::render::{draw_center_box, draw_main, draw_pip, Pixel, Style, Terminal, HELP_TEXT};
use crate::sprite::{FileSheetSource, SheetGrid};
use crate::storage::{JsonFileStore, Persister};
use crate::sync::{SyncHub, WindowId};
use crate::vitals::{CatchupSummary, VitalsModel};
use crate::window::{PetWindow, WindowConfig};
use crossterm::style::Color;
use std::{
    rc::Rc,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{info, warn};

/// Consecutive frame failures tolerated before the render loop gives up.
const FRAME_FAILURE_LIMIT: u32 = 50;

/// Counts consecutive failures; any success resets it.
struct FailureBudget {
    consecutive: u32,
    limit: u32,
}

impl FailureBudget {
    fn new(limit: u32) -> Self {
        Self {
            consecutive: 0,
            limit,
        }
    }

    fn record(&mut self, result: anyhow::Result<()>) -> anyhow::Result<()> {
        match result {
            Ok(()) => {
                self.consecutive = 0;
                Ok(())
            }
            Err(e) => {
                self.consecutive += 1;
                warn!(error = %e, failures = self.consecutive, "frame failed");
                if self.consecutive >= self.limit {
                    return Err(e.context(format!("{} frames failed in a row", self.consecutive)));
                }
                Ok(())
            }
        }
    }
}

pub(crate) struct App {
    settings: Settings,
    color_toggled: bool,
    paths: Paths,
    grid: SheetGrid,
    term: Terminal,
    persister: Persister,
    vitals: VitalsModel,
    metrics_rx: mpsc::UnboundedReceiver<Metrics>,
    hub: SyncHub,
    main: PetWindow,
    pip: PetWindow,
    focused: WindowId,
    help_open: bool,
    recap: Option<CatchupSummary>,
    should_quit: bool,
}

impl App {
    fn init(cli: &Cli, paths: Paths) -> anyhow::Result<Self> {
        let mut settings = load_settings(&paths.settings_path);
        settings.apply_cli(cli);

        let store = JsonFileStore::new(cli.save_file.clone().unwrap_or_else(|| paths.save_path.clone()));
        info!(
            save = %store.path().display(),
            sprites = %settings.sprite_dir.display(),
            frame_ms = settings.frame_interval().as_millis(),
            decay_secs = settings.decay_period().as_secs(),
            "starting"
        );
        let persister = Persister::new(Arc::new(store));

        let clock: Rc<dyn Clock> = Rc::new(SystemClock);
        let mut vitals = match persister.load() {
            Some(rec) => VitalsModel::restore(rec, clock),
            None => VitalsModel::new(clock),
        };

        // offline catch-up
        let summary = vitals.catch_up();
        let recap = summary.has_anything().then_some(summary);
        let metrics_rx = vitals.subscribe();

        let grid = SheetGrid {
            sheet_width: settings.sheet_width,
            sheet_height: settings.sheet_height,
            ..SheetGrid::default()
        };
        let hub = SyncHub::default();
        let metrics = vitals.snapshot();
        let now = Instant::now();
        let open = |id, display| {
            let cfg = WindowConfig {
                id,
                display,
                grid,
                frame_interval: settings.frame_interval(),
                load_timeout: settings.load_timeout(),
            };
            PetWindow::open(cfg, FileSheetSource::new(settings.sprite_dir.clone()), &hub, metrics, now)
        };
        let main = open(WindowId::Main, settings.main_size);
        let pip = open(WindowId::Pip, settings.pip_size);

        let term = Terminal::begin()?;

        Ok(Self {
            settings,
            color_toggled: false,
            paths,
            grid,
            term,
            persister,
            vitals,
            metrics_rx,
            hub,
            main,
            pip,
            focused: WindowId::Main,
            help_open: false,
            recap,
            should_quit: false,
        })
    }

    async fn event_loop(&mut self) -> anyhow::Result<()> {
        let mut frame = time::interval(self.settings.frame_interval());
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let decay_every = self.settings.decay_period();
        let mut decay = time::interval_at(time::Instant::now() + decay_every, decay_every);
        let save_every = self.settings.autosave_period();
        let mut autosave = time::interval_at(time::Instant::now() + save_every, save_every);
        let mut failures = FailureBudget::new(FRAME_FAILURE_LIMIT);

        while !self.should_quit {
            tokio::select! {
                _ = frame.tick() => {
                    let result = self.frame();
                    failures.record(result)?;
                }
                _ = decay.tick() => {
                    self.vitals.tick_now();
                }
                _ = autosave.tick() => {
                    self.persister.save_detached(self.vitals.record());
                }
            }
        }
        Ok(())
    }

    fn frame(&mut self) -> anyhow::Result<()> {
        self.term.resize_if_needed()?;

        for ev in collect_input_nonblocking(Duration::ZERO)? {
            // any key dismisses the recap
            if self.recap.take().is_some() {
                continue;
            }
            if let Some(cmd) = map_event(self.help_open, &ev) {
                self.handle(cmd);
            }
            if self.should_quit {
                return Ok(());
            }
        }

        self.sync();
        let now = Instant::now();
        self.main.advance(now);
        self.pip.advance(now);
        self.render()
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Quit => self.should_quit = true,
            Command::ToggleHelp => self.help_open = !self.help_open,
            Command::ToggleColor => {
                self.settings.enable_color = !self.settings.enable_color;
                self.color_toggled = true;
            }
            Command::ToggleView => {
                self.focused = match self.focused {
                    WindowId::Main => WindowId::Pip,
                    WindowId::Pip => WindowId::Main,
                };
                info!(window = %self.focused, "switched window");
            }
            Command::Act(action) => {
                let controller = ActionController::new(Some(&self.persister));
                let Some(token) = controller.perform(&mut self.vitals, action) else {
                    return;
                };
                let metrics = self.vitals.snapshot();
                let window = match self.focused {
                    WindowId::Main => &mut self.main,
                    WindowId::Pip => &mut self.pip,
                };
                window.on_action(token, metrics, &self.hub);
            }
        }
    }

    fn sync(&mut self) {
        sync_windows(&mut self.main, &mut self.pip, &mut self.metrics_rx, &self.hub);
    }

    fn render(&mut self) -> anyhow::Result<()> {
        self.term.cur.clear(Color::Black);
        self.term.canvas.clear(Pixel::default());

        let style = Style {
            enable_color: self.settings.enable_color,
            total_frames: self.grid.total_frames,
        };
        match self.focused {
            WindowId::Main => draw_main(&mut self.term, &self.main, &style),
            WindowId::Pip => draw_pip(&mut self.term, &self.pip, &style),
        }

        if let Some(s) = &self.recap {
            draw_center_box(&mut self.term.cur, "While you were away", &recap_text(s));
        }
        if self.help_open {
            draw_center_box(&mut self.term.cur, "How to care for your pet", HELP_TEXT);
        }

        self.term.present()
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.persister.settle().await;
        let saved = self.persister.save(&self.vitals.record());
        self.term.end()?;

        let mut on_disk = load_settings(&self.paths.settings_path);
        if self.color_toggled {
            on_disk.enable_color = self.settings.enable_color;
        }
        save_settings_atomic(&self.paths.settings_path, &on_disk)?;
        info!(saved, "shut down");
        Ok(())
    }
}

/// Loads, peer messages, then model notifications, so a peer's action
/// lands before the metrics it caused. The PiP is pumped again at the end
/// to pick up what the main window just published.
fn sync_windows(
    main: &mut PetWindow,
    pip: &mut PetWindow,
    metrics_rx: &mut mpsc::UnboundedReceiver<Metrics>,
    hub: &SyncHub,
) {
    main.pump();
    pip.pump();
    while let Ok(m) = metrics_rx.try_recv() {
        main.on_metrics(m, hub);
    }
    pip.pump();
}

fn recap_text(s: &CatchupSummary) -> String {
    let mut out = format!("{:.0} minutes went by.\n\n", s.minutes);
    for ((name, before), (_, after)) in s.before.bars().iter().zip(s.after.bars().iter()) {
        out.push_str(&format!("{name}  {:>3}% -> {:>3}%\n", percent(*before), percent(*after)));
    }
    out.push_str(&format!("\nAge: {} days\n\nPress any key", s.after.age));
    out
}

pub(crate) async fn run(cli: &Cli, paths: Paths) -> anyhow::Result<()> {
    let mut app = App::init(cli, paths)?;
    let result = app.event_loop().await;
    app.shutdown().await?;
    result
}
