use crate::sprite::DisplaySize;
use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "pipgotchi")]
#[command(about = "A terminal pet with a picture-in-picture window")]
pub(crate) struct Cli {
    /// Directory holding the sprite sheets (eating.png, happy.png, ...)
    #[arg(long)]
    pub(crate) sprites: Option<PathBuf>,

    /// Save file to use instead of the one in the data directory
    #[arg(long)]
    pub(crate) save_file: Option<PathBuf>,

    /// Milliseconds per animation frame
    #[arg(long)]
    pub(crate) frame_ms: Option<u64>,

    /// Seconds between decay ticks
    #[arg(long)]
    pub(crate) decay_secs: Option<u64>,

    /// Force monochrome (no colors)
    #[arg(long, default_value_t = false)]
    pub(crate) mono: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) sprite_dir: PathBuf,
    pub(crate) frame_ms: u64,
    pub(crate) decay_secs: u64,
    pub(crate) autosave_secs: u64,
    pub(crate) load_timeout_ms: u64,
    pub(crate) enable_color: bool,
    pub(crate) main_size: DisplaySize,
    pub(crate) pip_size: DisplaySize,
    pub(crate) sheet_width: f32,
    pub(crate) sheet_height: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sprite_dir: PathBuf::from("assets/sprites"),
            frame_ms: 200,
            decay_secs: 60,
            autosave_secs: 30,
            load_timeout_ms: 5000,
            enable_color: true,
            main_size: DisplaySize {
                width: 96,
                height: 96,
            },
            pip_size: DisplaySize {
                width: 48,
                height: 48,
            },
            sheet_width: 1280.0,
            sheet_height: 1066.0,
        }
    }
}

impl Settings {
    pub(crate) fn apply_cli(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.sprites {
            self.sprite_dir = dir.clone();
        }
        if let Some(ms) = cli.frame_ms {
            self.frame_ms = ms;
        }
        if let Some(secs) = cli.decay_secs {
            self.decay_secs = secs;
        }
        if cli.mono {
            self.enable_color = false;
        }
    }

    pub(crate) fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_ms.clamp(16, 5000))
    }

    pub(crate) fn decay_period(&self) -> Duration {
        Duration::from_secs(self.decay_secs.max(1))
    }

    pub(crate) fn autosave_period(&self) -> Duration {
        Duration::from_secs(self.autosave_secs.max(1))
    }

    pub(crate) fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms.max(1))
    }
}

pub(crate) struct Paths {
    pub(crate) save_path: PathBuf,
    pub(crate) settings_path: PathBuf,
    pub(crate) log_path: PathBuf,
}

pub(crate) fn project_paths() -> Result<Paths> {
    let proj = ProjectDirs::from("com", "pipgotchi", "Pipgotchi")
        .context("could not resolve project directories")?;
    let dir = proj.data_local_dir().to_path_buf();
    fs::create_dir_all(&dir).ok();
    Ok(Paths {
        save_path: dir.join("petState.json"),
        settings_path: dir.join("settings.json"),
        log_path: dir.join("pipgotchi.log"),
    })
}

pub(crate) fn load_settings(path: &Path) -> Settings {
    if let Ok(s) = fs::read_to_string(path) {
        if let Ok(v) = serde_json::from_str::<Settings>(&s) {
            return v;
        }
    }
    Settings::default()
}

pub(crate) fn save_settings_atomic(path: &Path, s: &Settings) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(s)?;
    fs::write(&tmp, data)?;
    atomic_rename(&tmp, path)?;
    Ok(())
}

fn atomic_rename(from: &Path, to: &Path) -> io::Result<()> {
    // rename over an existing file is not atomic on Windows
    if cfg!(windows) && to.exists() {
        let _ = fs::remove_file(to);
    }
    fs::rename(from, to)
}
