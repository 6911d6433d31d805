use crate::model::{ActionToken, VitalsDelta};
use crate::storage::Persister;
use crate::vitals::VitalsModel;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PetAction {
    Feed,
    Play,
    Clean,
    Sleep,
    Teach,
    Myob,
}

pub(crate) struct ActionEffect {
    pub(crate) token: ActionToken,
    /// Refused below this energy.
    pub(crate) min_energy: Option<f64>,
    pub(crate) delta: VitalsDelta,
}

impl PetAction {
    pub(crate) const ALL: [PetAction; 6] = [
        PetAction::Feed,
        PetAction::Play,
        PetAction::Clean,
        PetAction::Sleep,
        PetAction::Teach,
        PetAction::Myob,
    ];

    pub(crate) fn key(self) -> char {
        match self {
            PetAction::Feed => 'f',
            PetAction::Play => 'p',
            PetAction::Clean => 'c',
            PetAction::Sleep => 's',
            PetAction::Teach => 't',
            PetAction::Myob => 'm',
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            PetAction::Feed => "Feed",
            PetAction::Play => "Play",
            PetAction::Clean => "Clean",
            PetAction::Sleep => "Sleep",
            PetAction::Teach => "Teach",
            PetAction::Myob => "MYOB",
        }
    }

    pub(crate) fn effect(self) -> ActionEffect {
        let (token, min_energy, [hunger, happiness, energy, health, love]) = match self {
            PetAction::Feed => (ActionToken::Eating, None, [10.0, 5.0, 5.0, 5.0, 0.0]),
            PetAction::Play => (ActionToken::Playing, Some(20.0), [-15.0, 5.0, -20.0, 10.0, 15.0]),
            PetAction::Clean => (ActionToken::Cleaning, None, [-10.0, 5.0, 0.0, 10.0, 0.0]),
            PetAction::Sleep => (ActionToken::Sleeping, None, [-5.0, 0.0, 10.0, 5.0, 0.0]),
            PetAction::Teach => (ActionToken::Learning, Some(15.0), [-15.0, -5.0, -15.0, 0.0, 0.0]),
            PetAction::Myob => (ActionToken::Myob, None, [0.0, 15.0, 15.0, 0.0, 20.0]),
        };
        ActionEffect {
            token,
            min_energy,
            delta: VitalsDelta {
                hunger,
                happiness,
                energy,
                health,
                love,
            },
        }
    }
}

/// Gatekeeper between user actions and the vitals model.
pub(crate) struct ActionController<'a> {
    persister: Option<&'a Persister>,
}

impl<'a> ActionController<'a> {
    pub(crate) fn new(persister: Option<&'a Persister>) -> Self {
        Self { persister }
    }

    /// Returns the animation token, or `None` when the pet refuses (too
    /// tired). A refusal leaves vitals untouched and emits nothing.
    pub(crate) fn perform(&self, vitals: &mut VitalsModel, action: PetAction) -> Option<ActionToken> {
        let effect = action.effect();
        if let Some(min) = effect.min_energy {
            let energy = vitals.vitals().energy;
            if energy < min {
                debug!(action = action.label(), energy, min, "action refused");
                return None;
            }
        }

        vitals.apply_action(&effect.delta);
        if let Some(p) = self.persister {
            p.save_detached(vitals.record());
        }
        debug!(action = action.label(), token = %effect.token, "action accepted");
        Some(effect.token)
    }
}
