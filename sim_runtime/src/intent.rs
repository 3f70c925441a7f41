use std::fmt;

/// Control dimensions the viewer can change optimistically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlDimension {
    Paused,
    MoleculeLimit,
}

impl ControlDimension {
    pub const ALL: [ControlDimension; 2] = [ControlDimension::Paused, ControlDimension::MoleculeLimit];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlDimension::Paused => "paused",
            ControlDimension::MoleculeLimit => "molecule_limit",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ControlDimension::Paused => 0,
            ControlDimension::MoleculeLimit => 1,
        }
    }
}

impl fmt::Display for ControlDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally issued change the server has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intent<T> {
    pub target: T,
    /// Retransmissions so far; the initial send is not counted.
    pub attempts: u32,
}

/// Holds at most one outstanding [`Intent`] for a single dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentSlot<T> {
    current: Option<Intent<T>>,
}

impl<T> Default for IntentSlot<T> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<T: Copy + PartialEq> IntentSlot<T> {
    /// Register a fresh intent, returning the one it abandons.
    pub fn set(&mut self, target: T) -> Option<Intent<T>> {
        self.current.replace(Intent {
            target,
            attempts: 0,
        })
    }

    pub fn clear(&mut self) -> Option<Intent<T>> {
        self.current.take()
    }

    pub fn get(&self) -> Option<&Intent<T>> {
        self.current.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.current.is_some()
    }

    /// True when an intent is pending and targets `value`.
    pub fn matches(&self, value: T) -> bool {
        self.current
            .as_ref()
            .map_or(false, |intent| intent.target == value)
    }

    /// Count one retransmission and return the new attempt total.
    pub fn record_attempt(&mut self) -> Option<u32> {
        self.current.as_mut().map(|intent| {
            intent.attempts += 1;
            intent.attempts
        })
    }
}

/// Outstanding intents for every [`ControlDimension`].
#[derive(Debug, Clone, Default)]
pub struct IntentTracker {
    pub(crate) paused: IntentSlot<bool>,
    pub(crate) molecule_limit: IntentSlot<u32>,
}

impl IntentTracker {
    pub fn paused(&self) -> &IntentSlot<bool> {
        &self.paused
    }

    pub fn molecule_limit(&self) -> &IntentSlot<u32> {
        &self.molecule_limit
    }

    pub fn is_pending(&self, dimension: ControlDimension) -> bool {
        match dimension {
            ControlDimension::Paused => self.paused.is_pending(),
            ControlDimension::MoleculeLimit => self.molecule_limit.is_pending(),
        }
    }

    pub fn attempts(&self, dimension: ControlDimension) -> Option<u32> {
        match dimension {
            ControlDimension::Paused => self.paused.get().map(|intent| intent.attempts),
            ControlDimension::MoleculeLimit => {
                self.molecule_limit.get().map(|intent| intent.attempts)
            }
        }
    }

    pub fn clear(&mut self, dimension: ControlDimension) -> bool {
        match dimension {
            ControlDimension::Paused => self.paused.clear().is_some(),
            ControlDimension::MoleculeLimit => self.molecule_limit.clear().is_some(),
        }
    }

    pub fn clear_all(&mut self) {
        for dimension in ControlDimension::ALL {
            self.clear(dimension);
        }
    }

    pub fn any_pending(&self) -> bool {
        ControlDimension::ALL
            .iter()
            .any(|dimension| self.is_pending(*dimension))
    }
}
