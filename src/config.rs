//! Heap configuration
//!
//! Every knob is fixed when the heap is built. [`Config::DEFAULT`] follows the
//! crate features:
//!
//! - `integrity-check` - walk both lists before every operation
//! - `poison` - stamp guard bytes around every allocation
//!
//! The search strategy is picked by type, see [`DefaultFit`](crate::prelude::DefaultFit).

use crate::error::Corruption;

/// Byte stamped into every guard region
pub const POISON_BYTE: u8 = 0xA5;

/// Width of the stored request length in a poisoned allocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LenWidth {
    /// Up to 255 bytes per allocation
    U8,
    /// Up to 65535 bytes per allocation
    U16,
    /// Any allocation the heap can hold
    U32,
}

impl LenWidth {
    /// Size of the field in bytes
    pub const fn bytes(self) -> usize {
        match self {
            LenWidth::U8 => 1,
            LenWidth::U16 => 2,
            LenWidth::U32 => 4,
        }
    }

    /// Largest length the field can record
    pub const fn max_len(self) -> usize {
        match self {
            LenWidth::U8 => u8::MAX as usize,
            LenWidth::U16 => u16::MAX as usize,
            // saturates on targets where usize is narrower than 32 bits
            LenWidth::U32 => {
                if usize::BITS < u32::BITS {
                    usize::MAX
                } else {
                    u32::MAX as usize
                }
            }
        }
    }
}

/// Guard layout for poisoned allocations
///
/// An allocation is laid out as `[len][before guard][payload][after guard]`
/// and the handle points at the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoisonConfig {
    /// Guard bytes in front of the payload
    pub before: usize,
    /// Guard bytes behind the requested length
    pub after: usize,
    /// Width of the stored request length
    pub len_width: LenWidth,
}

impl PoisonConfig {
    /// 4 guard bytes on each side and a 16-bit length
    pub const DEFAULT: PoisonConfig = PoisonConfig {
        before: 4,
        after: 4,
        len_width: LenWidth::U16,
    };

    /// Bytes between the start of the payload area and the handle
    pub const fn prefix(&self) -> usize {
        self.len_width.bytes() + self.before
    }

    /// Total bytes added to every request
    pub const fn overhead(&self) -> usize {
        self.prefix() + self.after
    }
}

impl Default for PoisonConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What to do when `free`/`resize` receive a handle that is not live
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidPointerPolicy {
    /// Log a warning and return [`HeapError::InvalidPointer`](crate::error::HeapError)
    Report,
    /// Panic
    Fatal,
}

/// Default corruption hook: logs and lets the operation fail
pub fn log_corruption(corruption: &Corruption) {
    log::error!("heap corruption detected: {corruption}");
}

/// Build-time heap configuration
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Verify both lists before every public operation
    pub integrity_check: bool,
    /// Guard-byte stamping, `None` disables it
    pub poison: Option<PoisonConfig>,
    /// Reaction to stale or foreign handles
    pub invalid_pointer: InvalidPointerPolicy,
    /// Called once per detected corruption, before the operation fails
    pub on_corruption: fn(&Corruption),
}

impl Config {
    /// Configuration selected by the crate features
    pub const DEFAULT: Config = Config {
        integrity_check: cfg!(feature = "integrity-check"),
        poison: if cfg!(feature = "poison") {
            Some(PoisonConfig::DEFAULT)
        } else {
            None
        },
        invalid_pointer: InvalidPointerPolicy::Report,
        on_corruption: log_corruption,
    };

    /// No checks at all, regardless of features
    pub const PLAIN: Config = Config {
        integrity_check: false,
        poison: None,
        invalid_pointer: InvalidPointerPolicy::Report,
        on_corruption: log_corruption,
    };

    /// Turns the automatic integrity walk on or off
    pub const fn with_integrity_check(mut self, enabled: bool) -> Self {
        self.integrity_check = enabled;
        self
    }

    /// Enables guard-byte stamping
    pub const fn with_poison(mut self, poison: PoisonConfig) -> Self {
        self.poison = Some(poison);
        self
    }

    /// Disables guard-byte stamping
    pub const fn without_poison(mut self) -> Self {
        self.poison = None;
        self
    }

    /// Sets the reaction to invalid handles
    pub const fn with_invalid_pointer(mut self, policy: InvalidPointerPolicy) -> Self {
        self.invalid_pointer = policy;
        self
    }

    /// Replaces the corruption callback
    pub const fn with_corruption_hook(mut self, hook: fn(&Corruption)) -> Self {
        self.on_corruption = hook;
        self
    }

    /// Bytes in front of the handle inside the payload area
    pub(crate) const fn prefix(&self) -> usize {
        match self.poison {
            Some(p) => p.prefix(),
            None => 0,
        }
    }

    /// Bytes added to every request
    pub(crate) const fn overhead(&self) -> usize {
        match self.poison {
            Some(p) => p.overhead(),
            None => 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}
