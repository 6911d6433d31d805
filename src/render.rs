use crate::animation::{FrameView, Phase};
use crate::model::{percent, Metrics};
use crate::sprite::{DisplaySize, SourceRect, SpriteSheet};
use crate::window::PetWindow;
use crossterm::{
    cursor, execute, queue,
    style::{Color, Colors, Print, ResetColor, SetColors},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) ch: char,
    pub(crate) fg: Color,
    pub(crate) bg: Color,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::White,
            bg: Color::Black,
        }
    }
}

pub(crate) struct CellBuffer {
    pub(crate) w: u16,
    pub(crate) h: u16,
    pub(crate) cells: Vec<Cell>,
}

impl CellBuffer {
    pub(crate) fn new(w: u16, h: u16) -> Self {
        Self::filled(w, h, Cell::default())
    }
    fn filled(w: u16, h: u16, c: Cell) -> Self {
        Self {
            w,
            h,
            cells: vec![c; (w as usize) * (h as usize)],
        }
    }
    pub(crate) fn idx(&self, x: u16, y: u16) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn set(&mut self, x: u16, y: u16, c: Cell) {
        if x < self.w && y < self.h {
            let i = self.idx(x, y);
            self.cells[i] = c;
        }
    }
    pub(crate) fn clear(&mut self, bg: Color) {
        self.cells.fill(Cell {
            bg,
            ..Cell::default()
        });
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Pixel {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

impl From<[u8; 4]> for Pixel {
    fn from([r, g, b, a]: [u8; 4]) -> Self {
        Self { r, g, b, a }
    }
}

impl Pixel {
    /// `self` composited over `dst`, straight alpha.
    fn over(self, dst: Pixel) -> Pixel {
        let sa = self.a as f32 / 255.0;
        let da = dst.a as f32 / 255.0 * (1.0 - sa);
        let a = sa + da;
        if a <= 1e-6 {
            return Pixel::default();
        }
        let mix = |s: u8, d: u8| ((s as f32 * sa + d as f32 * da) / a + 0.5).min(255.0) as u8;
        Pixel {
            r: mix(self.r, dst.r),
            g: mix(self.g, dst.g),
            b: mix(self.b, dst.b),
            a: (a * 255.0 + 0.5).min(255.0) as u8,
        }
    }
}

/// Subpixel layer under the braille cells, 2×4 per terminal cell.
pub(crate) struct PixelCanvas {
    pub(crate) w: u32,
    pub(crate) h: u32,
    pub(crate) px: Vec<Pixel>,
}

impl PixelCanvas {
    pub(crate) fn new(w: u32, h: u32) -> Self {
        Self {
            w,
            h,
            px: vec![Pixel::default(); (w as usize) * (h as usize)],
        }
    }
    pub(crate) fn idx(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    fn get(&self, x: u32, y: u32) -> Option<Pixel> {
        (x < self.w && y < self.h).then(|| self.px[self.idx(x, y)])
    }
    pub(crate) fn clear(&mut self, p: Pixel) {
        self.px.fill(p);
    }
    pub(crate) fn blend_over(&mut self, x: i32, y: i32, src: Pixel) {
        let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
            return;
        };
        if let Some(dst) = self.get(x, y) {
            let i = self.idx(x, y);
            self.px[i] = src.over(dst);
        }
    }
}

// Never equal to a real cell, so the next present repaints everything.
const STALE: Cell = Cell {
    ch: '\0',
    fg: Color::Reset,
    bg: Color::Reset,
};

pub(crate) struct Terminal {
    out: io::Stdout,
    pub(crate) cols: u16,
    pub(crate) rows: u16,
    prev: CellBuffer,
    pub(crate) cur: CellBuffer,
    pub(crate) canvas: PixelCanvas,
}

impl Terminal {
    pub(crate) fn begin() -> anyhow::Result<Self> {
        let mut out = io::stdout();
        execute!(
            out,
            EnterAlternateScreen,
            cursor::Hide,
            DisableLineWrap,
            Clear(ClearType::All)
        )?;
        terminal::enable_raw_mode()?;

        let (cols, rows) = terminal::size()?;
        Ok(Self {
            out,
            cols,
            rows,
            prev: CellBuffer::filled(cols, rows, STALE),
            cur: CellBuffer::new(cols, rows),
            canvas: PixelCanvas::new(cols as u32 * 2, rows as u32 * 4),
        })
    }

    pub(crate) fn end(&mut self) -> anyhow::Result<()> {
        queue!(
            self.out,
            ResetColor,
            Clear(ClearType::All),
            cursor::Show,
            EnableLineWrap,
            LeaveAlternateScreen
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    pub(crate) fn resize_if_needed(&mut self) -> anyhow::Result<bool> {
        let (c, r) = terminal::size()?;
        if (c, r) == (self.cols, self.rows) {
            return Ok(false);
        }
        self.cols = c;
        self.rows = r;
        self.prev = CellBuffer::filled(c, r, STALE);
        self.cur = CellBuffer::new(c, r);
        self.canvas = PixelCanvas::new(c as u32 * 2, r as u32 * 4);
        queue!(self.out, Clear(ClearType::All))?;
        Ok(true)
    }

    /// Writes the cells that changed since the last present, one cursor
    /// move per run of adjacent changes.
    pub(crate) fn present(&mut self) -> anyhow::Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;
        let mut pen: Option<(Color, Color)> = None;

        for y in 0..self.rows {
            let mut x = 0;
            while x < self.cols {
                if self.cur.cells[self.cur.idx(x, y)] == self.prev.cells[self.prev.idx(x, y)] {
                    x += 1;
                    continue;
                }
                queue!(self.out, cursor::MoveTo(x, y))?;
                while x < self.cols {
                    let i = self.cur.idx(x, y);
                    let c = self.cur.cells[i];
                    if c == self.prev.cells[i] {
                        break;
                    }
                    if pen != Some((c.fg, c.bg)) {
                        queue!(self.out, SetColors(Colors::new(c.fg, c.bg)))?;
                        pen = Some((c.fg, c.bg));
                    }
                    queue!(self.out, Print(c.ch))?;
                    x += 1;
                }
            }
        }

        queue!(self.out, ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.prev.cells.copy_from_slice(&self.cur.cells);
        Ok(())
    }
}

/* -----------------------------
   Braille encoding: 2×4 pixels -> U+2800..U+28FF
------------------------------ */

// dot bit for [column][row] inside a cell
const BRAILLE_DOTS: [[u8; 4]; 2] = [[0x01, 0x02, 0x04, 0x40], [0x08, 0x10, 0x20, 0x80]];

// alpha at or above this counts as ink
const INK_ALPHA: u8 = 32;

pub(crate) fn canvas_to_cells(canvas: &PixelCanvas, out: &mut CellBuffer, enable_color: bool, bg: Color) {
    for cy in 0..out.h {
        for cx in 0..out.w {
            let mut mask = 0u8;
            let mut sum = [0u32; 3];
            let mut ink = 0u32;

            for (dx, column) in BRAILLE_DOTS.iter().enumerate() {
                for (dy, bit) in column.iter().enumerate() {
                    let x = cx as u32 * 2 + dx as u32;
                    let y = cy as u32 * 4 + dy as u32;
                    let Some(p) = canvas.get(x, y).filter(|p| p.a >= INK_ALPHA) else {
                        continue;
                    };
                    mask |= bit;
                    sum[0] += p.r as u32;
                    sum[1] += p.g as u32;
                    sum[2] += p.b as u32;
                    ink += 1;
                }
            }

            // blank cells stay spaces so text overlays read cleanly
            if mask == 0 {
                continue;
            }
            let ch = char::from_u32(0x2800 + mask as u32).unwrap_or(' ');
            let fg = if enable_color {
                Color::Rgb {
                    r: (sum[0] / ink) as u8,
                    g: (sum[1] / ink) as u8,
                    b: (sum[2] / ink) as u8,
                }
            } else {
                Color::White
            };
            out.set(cx, cy, Cell { ch, fg, bg });
        }
    }
}

/* -----------------------------
   Sprite viewport
------------------------------ */

/// A rectangle in terminal cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CellRect {
    pub(crate) x: u16,
    pub(crate) y: u16,
    pub(crate) w: u16,
    pub(crate) h: u16,
}

/// A rectangle in braille subpixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Viewport {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) w: i32,
    pub(crate) h: i32,
}

impl Viewport {
    /// Centers a display-sized viewport inside `area`, shrinking it if the
    /// terminal is too small.
    pub(crate) fn centered(area: CellRect, display: DisplaySize) -> Self {
        let w = (display.width as i32).min(area.w as i32 * 2).max(0);
        let h = (display.height as i32).min(area.h as i32 * 4).max(0);
        Self {
            x: area.x as i32 * 2 + (area.w as i32 * 2 - w) / 2,
            y: area.y as i32 * 4 + (area.h as i32 * 4 - h) / 2,
            w,
            h,
        }
    }

    fn cell_center(&self) -> (u16, u16) {
        (
            ((self.x + self.w / 2) / 2).max(0) as u16,
            ((self.y + self.h / 2) / 4).max(0) as u16,
        )
    }
}

/// Scales one frame of `sheet` into `vp` (nearest neighbour).
pub(crate) fn blit_frame(canvas: &mut PixelCanvas, sheet: &SpriteSheet, src: SourceRect, vp: Viewport) {
    if vp.w <= 0 || vp.h <= 0 {
        return;
    }
    let sx = src.w / vp.w as f32;
    let sy = src.h / vp.h as f32;
    for dy in 0..vp.h {
        let y = src.y + (dy as f32 + 0.5) * sy;
        for dx in 0..vp.w {
            let x = src.x + (dx as f32 + 0.5) * sx;
            let p = Pixel::from(sheet.sample(x, y));
            if p.a > 0 {
                canvas.blend_over(vp.x + dx, vp.y + dy, p);
            }
        }
    }
}

/// Draws the window's current frame into the canvas. Placeholders are text,
/// so they are handed back for the caller to put on top of the cells.
pub(crate) fn draw_sprite<'a>(canvas: &mut PixelCanvas, view: &'a FrameView<'_>, vp: Viewport) -> Option<&'a str> {
    match view {
        FrameView::Sprite { sheet, src } => {
            blit_frame(canvas, sheet, *src, vp);
            None
        }
        FrameView::Placeholder(msg) => Some(msg.as_ref()),
    }
}

/* -----------------------------
   Text, bars and boxes
------------------------------ */

pub(crate) fn draw_text(buf: &mut CellBuffer, x: u16, y: u16, s: &str, fg: Color, bg: Color) {
    for (i, ch) in s.chars().enumerate() {
        let xx = x.saturating_add(i as u16);
        if xx >= buf.w || y >= buf.h {
            break;
        }
        buf.set(xx, y, Cell { ch, fg, bg });
    }
}

fn draw_centered(buf: &mut CellBuffer, cx: u16, y: u16, s: &str, fg: Color, bg: Color) {
    let half = (s.chars().count() / 2) as u16;
    draw_text(buf, cx.saturating_sub(half), y, s, fg, bg);
}

fn bar(value: f64, width: usize) -> String {
    let fill = (percent(value) as usize * width + 50) / 100;
    let mut s = String::with_capacity(width + 2);
    s.push('[');
    for i in 0..width {
        s.push(if i < fill { '█' } else { ' ' });
    }
    s.push(']');
    s
}

fn bar_color(value: f64, enable_color: bool) -> Color {
    if !enable_color {
        return Color::White;
    }
    if value > 60.0 {
        Color::Green
    } else if value > 30.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

pub(crate) fn draw_box(buf: &mut CellBuffer, r: CellRect, title: &str, fg: Color, bg: Color) {
    if r.w < 2 || r.h < 2 {
        return;
    }
    let (x1, y1) = (r.x + r.w - 1, r.y + r.h - 1);
    for x in r.x..=x1 {
        for y in r.y..=y1 {
            let ch = match (x == r.x, x == x1, y == r.y, y == y1) {
                (true, _, true, _) => '┌',
                (_, true, true, _) => '┐',
                (true, _, _, true) => '└',
                (_, true, _, true) => '┘',
                (_, _, true, _) | (_, _, _, true) => '─',
                (true, _, _, _) | (_, true, _, _) => '│',
                _ => continue,
            };
            buf.set(x, y, Cell { ch, fg, bg });
        }
    }
    if !title.is_empty() {
        draw_text(buf, r.x + 2, r.y, &format!(" {title} "), fg, bg);
    }
}

/// Clears the inside of a rectangle, borders included.
fn fill(buf: &mut CellBuffer, r: CellRect, bg: Color) {
    for y in r.y..r.y.saturating_add(r.h) {
        for x in r.x..r.x.saturating_add(r.w) {
            buf.set(x, y, Cell { bg, ..Cell::default() });
        }
    }
}

pub(crate) fn draw_center_box(buf: &mut CellBuffer, title: &str, body: &str) {
    let (fg, bg) = (Color::White, Color::Black);
    let bw = 60.min(buf.w.saturating_sub(4));
    let bh = 18.min(buf.h.saturating_sub(4));
    let r = CellRect {
        x: (buf.w - bw) / 2,
        y: (buf.h - bh) / 2,
        w: bw,
        h: bh,
    };
    fill(buf, r, bg);
    draw_box(buf, r, title, fg, bg);

    for (i, line) in body.lines().enumerate() {
        let y = r.y + 2 + i as u16;
        if y + 1 >= r.y + r.h {
            break;
        }
        draw_text(buf, r.x + 2, y, line, fg, bg);
    }
}

fn phase_label(phase: Phase, total_frames: u32) -> String {
    match phase {
        Phase::Idle(e) => format!("idle ({e})"),
        Phase::ActionPlaying { token, progress } => format!("{token} {}/{total_frames}", progress + 1),
    }
}

/* -----------------------------
   Window layouts
------------------------------ */

pub(crate) struct Style {
    pub(crate) enable_color: bool,
    pub(crate) total_frames: u32,
}

const MAIN_HELP: &str = "f feed | p play | c clean | s sleep | t teach | m myob | tab minimize | h help | q quit";
const PIP_HELP: &str = "tab restore | f p c s t m act | q quit";

fn metric_lines(buf: &mut CellBuffer, x: u16, y: u16, m: &Metrics, width: usize, style: &Style) {
    let bg = Color::Black;
    for (i, (name, val)) in m.bars().iter().enumerate() {
        let line = format!("{name} {} {:>3}%", bar(*val, width), percent(*val));
        draw_text(buf, x, y + i as u16, &line, bar_color(*val, style.enable_color), bg);
    }
}

/// Full layout: stats panel on the left, sprite on the right.
pub(crate) fn draw_main(term: &mut Terminal, w: &PetWindow, style: &Style) {
    let (fg, bg) = (Color::White, Color::Black);
    let cols = term.cols;
    let rows = term.rows;

    let panel_w = (cols / 3).max(30).min(cols.saturating_sub(10));
    let area = CellRect {
        x: panel_w,
        y: 1,
        w: cols.saturating_sub(panel_w),
        h: rows.saturating_sub(2),
    };
    let vp = Viewport::centered(area, w.engine().display());
    let view = w.engine().frame_view();
    let placeholder = draw_sprite(&mut term.canvas, &view, vp);
    canvas_to_cells(&term.canvas, &mut term.cur, style.enable_color, bg);
    if let Some(msg) = placeholder {
        let (cx, cy) = vp.cell_center();
        draw_centered(&mut term.cur, cx, cy, msg, fg, bg);
    }

    let m = w.metrics();
    let buf = &mut term.cur;
    let title = format!("Pipgotchi  |  Emotion: {}", m.emotion);
    draw_text(buf, 1, 0, &title, fg, bg);
    metric_lines(buf, 1, 2, &m, 14, style);
    draw_text(buf, 1, 8, &format!("Age:   {} days", m.age), fg, bg);
    draw_text(
        buf,
        1,
        9,
        &format!(
            "Now:   {}  [frame {:>2}]",
            phase_label(w.engine().phase(), style.total_frames),
            w.engine().current_frame()
        ),
        fg,
        bg,
    );
    draw_text(buf, 1, rows.saturating_sub(1), MAIN_HELP, fg, bg);
}

/// The cell rectangle of the PiP inset, bottom-right with a one-cell margin.
pub(crate) fn pip_rect(cols: u16, rows: u16, display: DisplaySize) -> CellRect {
    let inner_w = (display.width as u16).div_ceil(2).max(22);
    let inner_h = (display.height as u16).div_ceil(4) + 2;
    let w = (inner_w + 2).min(cols);
    let h = (inner_h + 2).min(rows.saturating_sub(1));
    CellRect {
        x: cols.saturating_sub(w + 1),
        y: rows.saturating_sub(h + 1),
        w,
        h,
    }
}

/// Compact inset: sprite on top, two short bar rows underneath.
pub(crate) fn draw_pip(term: &mut Terminal, w: &PetWindow, style: &Style) {
    let (fg, bg) = (Color::White, Color::Black);
    let r = pip_rect(term.cols, term.rows, w.engine().display());
    if r.w < 4 || r.h < 5 {
        return;
    }
    let sprite_area = CellRect {
        x: r.x + 1,
        y: r.y + 1,
        w: r.w - 2,
        h: r.h - 4,
    };
    let vp = Viewport::centered(sprite_area, w.engine().display());
    let view = w.engine().frame_view();
    let placeholder = draw_sprite(&mut term.canvas, &view, vp);
    canvas_to_cells(&term.canvas, &mut term.cur, style.enable_color, bg);

    let buf = &mut term.cur;
    if let Some(msg) = placeholder {
        let (cx, cy) = vp.cell_center();
        draw_centered(buf, cx, cy, msg, fg, bg);
    }
    draw_box(buf, r, &format!("Pipgotchi · {}", w.engine().current_emotion()), fg, bg);

    let m = w.metrics();
    let short = |label: char, v: f64| format!("{label}{:>3}", percent(v));
    let top = format!(
        "{} {} {}",
        short('H', m.hunger),
        short('J', m.happiness),
        short('E', m.energy)
    );
    let bottom = format!("{} {} A{}d", short('+', m.health), short('L', m.love), m.age);
    draw_text(buf, r.x + 1, r.y + r.h - 3, &top, fg, bg);
    draw_text(buf, r.x + 1, r.y + r.h - 2, &bottom, fg, bg);
    draw_text(buf, 1, 0, PIP_HELP, fg, bg);
}

pub(crate) const HELP_TEXT: &str = "Keep your pet fed, rested and loved.\n\
Vitals drain in real time, even while the app is closed.\n\n\
F Feed   +hunger +happiness +energy +health\n\
P Play   needs 20 energy; +love, costs hunger\n\
C Clean  +health +happiness\n\
S Sleep  +energy\n\
T Teach  needs 15 energy; tiring and hungry work\n\
M MYOB   leave it be: +happiness +energy +love\n\n\
Tab minimizes to the picture-in-picture inset.\n\
X toggles color. Esc or H closes this help.";
