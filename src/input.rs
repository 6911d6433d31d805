use crate::actions::PetAction;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::time::Duration;

#[derive(Clone, Debug)]
pub(crate) struct InputEvent {
    pub(crate) key: KeyCode,
    pub(crate) mods: KeyModifiers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Act(PetAction),
    /// Minimize the main window to PiP, or restore it.
    ToggleView,
    ToggleColor,
    ToggleHelp,
    Quit,
}

/// Everything already waiting on stdin. Never blocks longer than `wait`.
pub(crate) fn collect_input_nonblocking(wait: Duration) -> anyhow::Result<Vec<InputEvent>> {
    let mut out = Vec::new();
    let mut timeout = wait;
    while event::poll(timeout)? {
        timeout = Duration::ZERO;
        if let Event::Key(k) = event::read()? {
            if k.kind == KeyEventKind::Press || k.kind == KeyEventKind::Repeat {
                out.push(InputEvent {
                    key: k.code,
                    mods: k.modifiers,
                });
                if out.len() >= 32 {
                    break;
                }
            }
        }
    }
    Ok(out)
}

pub(crate) fn map_event(help_open: bool, ev: &InputEvent) -> Option<Command> {
    if matches!(ev.key, KeyCode::Char('c') | KeyCode::Char('C'))
        && ev.mods.contains(KeyModifiers::CONTROL)
    {
        return Some(Command::Quit);
    }
    match ev.key {
        KeyCode::Char('q') | KeyCode::Char('Q') => return Some(Command::Quit),
        KeyCode::Char('h') | KeyCode::Char('H') => return Some(Command::ToggleHelp),
        KeyCode::Esc if help_open => return Some(Command::ToggleHelp),
        KeyCode::Esc => return Some(Command::Quit),
        _ => {}
    }
    if help_open {
        return None;
    }

    match ev.key {
        KeyCode::Tab | KeyCode::BackTab => Some(Command::ToggleView),
        KeyCode::Char(ch) => {
            let ch = ch.to_ascii_lowercase();
            if ch == 'x' {
                return Some(Command::ToggleColor);
            }
            PetAction::ALL
                .iter()
                .find(|a| a.key() == ch)
                .map(|a| Command::Act(*a))
        }
        _ => None,
    }
}
