use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ecospy_core::session::Stage;

use crate::app::App;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    None,
    Quit,
    /// Open the camera view.
    StartCapture,
    /// Run `service.capture`(...) on the open camera
    Capture,
    CloseCamera,
    /// Leave review for identity entry
    Proceed,
    /// Run `service.identify`(...) with the typed text
    SubmitIdentity,
    RejectIdentity,
    /// Run `service.settle`(...) for the confirmed user
    ConfirmPayout,
    ReturnHome,
    Cancel,
}

pub(crate) fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    use KeyCode::{Backspace, Char, Enter, Esc};

    // Global quit shortcuts
    if key.code == Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }
    let typing = matches!(app.stage(), Stage::IdentityEntry);
    if !typing && key.code == Char('q') && key.modifiers.is_empty() {
        return Action::Quit;
    }

    match app.stage() {
        Stage::Idle => match key.code {
            Enter | Char(' ') => Action::StartCapture,
            _ => Action::None,
        },

        Stage::Capturing => match key.code {
            Char('p') => Action::Capture,
            Esc => Action::CloseCamera,
            _ => Action::None,
        },

        Stage::Reviewing => match key.code {
            Char('a') => Action::StartCapture,
            Char('n') | Enter => Action::Proceed,
            Char('c') | Esc => Action::Cancel,
            _ => Action::None,
        },

        Stage::IdentityEntry => match key.code {
            Char(character) => {
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT)
                {
                    app.identity_input.push(character);
                }
                Action::None
            }
            Backspace => {
                app.identity_input.pop();
                Action::None
            }
            Enter => Action::SubmitIdentity,
            Esc => Action::Cancel,
            _ => Action::None,
        },

        Stage::IdentityConfirmed { .. } => match key.code {
            Enter | Char('y') => Action::ConfirmPayout,
            Char('n' | 'b') => Action::RejectIdentity,
            Esc => Action::Cancel,
            _ => Action::None,
        },

        Stage::PayoutConfirmed(_) => Action::ReturnHome,
    }
}
